//! Black-box scenario tests driving a real `pulsehubd` process over
//! WebSocket, one test per scenario from `spec.md` §8. Grounded on the
//! teacher's own `tests/channel_flow.rs` (one top-level scenario file,
//! `tests/common` harness, fixed port per test since tests run in parallel).

mod common;

use common::{sign_token, TestClient, TestServer};
use pulsehub_wire::{EnvelopePayload, PublishRequest, SubscribeRequest};

/// S1: local fan-out. Two clients subscribed to the same channel; one
/// publishes; both (including the publisher, who is also a subscriber)
/// receive the fanned-out ChannelEvent frame with the sender id and
/// server timestamp intact, and the publisher also gets an Ack.
#[tokio::test]
async fn s1_local_fan_out_reaches_all_subscribers() {
    let server = TestServer::spawn(17801).await.unwrap();
    server
        .seed_channel("tenant-a", "room", false, false)
        .await
        .unwrap();
    server
        .seed_client("tenant-a", "alice", &["room"])
        .await
        .unwrap();
    server
        .seed_client("tenant-a", "bob", &["room"])
        .await
        .unwrap();

    let token_alice = sign_token(&server.token_secret, "Client", "tenant-a", "alice");
    let token_bob = sign_token(&server.token_secret, "Client", "tenant-a", "bob");

    let mut alice = TestClient::connect(&server.ws_url(), &token_alice).await.unwrap();
    let mut bob = TestClient::connect(&server.ws_url(), &token_bob).await.unwrap();

    alice
        .send(EnvelopePayload::Subscribe(SubscribeRequest {
            id: 1,
            channel_id: "room".into(),
        }))
        .await
        .unwrap();
    assert_ack_ok(alice.recv().await.unwrap(), 1);

    bob.send(EnvelopePayload::Subscribe(SubscribeRequest {
        id: 1,
        channel_id: "room".into(),
    }))
    .await
    .unwrap();
    assert_ack_ok(bob.recv().await.unwrap(), 1);

    alice
        .send(EnvelopePayload::Publish(PublishRequest {
            id: 2,
            channel_id: "room".into(),
            event_type: "msg".into(),
            payload: b"hello".to_vec(),
        }))
        .await
        .unwrap();

    let ack = alice
        .recv_matching(|p| matches!(p, EnvelopePayload::Ack(a) if a.reply_to == 2))
        .await
        .unwrap();
    assert_ack_ok(ack, 2);

    let published = alice
        .recv_matching(|p| matches!(p, EnvelopePayload::ChannelEvent(e) if e.channel_id == "room"))
        .await
        .unwrap();
    assert_channel_event(&published, "alice", "msg", b"hello");

    let published = bob
        .recv_matching(|p| matches!(p, EnvelopePayload::ChannelEvent(e) if e.channel_id == "room"))
        .await
        .unwrap();
    assert_channel_event(&published, "alice", "msg", b"hello");
}

/// S6: admission. A client without `room` in its allowed channels is denied
/// both subscribe (Ack false) and publish (Ack false); a fire-and-forget
/// publish (id 0) to the same disallowed channel produces no reply at all.
#[tokio::test]
async fn s6_admission_rejects_disallowed_channel() {
    let server = TestServer::spawn(17802).await.unwrap();
    server
        .seed_channel("tenant-a", "room", false, false)
        .await
        .unwrap();
    server
        .seed_client("tenant-a", "eve", &["other-room"])
        .await
        .unwrap();

    let token = sign_token(&server.token_secret, "Client", "tenant-a", "eve");
    let mut eve = TestClient::connect(&server.ws_url(), &token).await.unwrap();

    eve.send(EnvelopePayload::Subscribe(SubscribeRequest {
        id: 1,
        channel_id: "room".into(),
    }))
    .await
    .unwrap();
    let ack = eve.recv().await.unwrap();
    match ack.payload {
        EnvelopePayload::Ack(a) => {
            assert_eq!(a.reply_to, 1);
            assert!(!a.status);
        }
        other => panic!("expected Ack, got {other:?}"),
    }

    eve.send(EnvelopePayload::Publish(PublishRequest {
        id: 9,
        channel_id: "room".into(),
        event_type: "msg".into(),
        payload: b"nope".to_vec(),
    }))
    .await
    .unwrap();
    let ack = eve.recv().await.unwrap();
    match ack.payload {
        EnvelopePayload::Ack(a) => {
            assert_eq!(a.reply_to, 9);
            assert!(!a.status);
        }
        other => panic!("expected Ack, got {other:?}"),
    }

    eve.send(EnvelopePayload::Publish(PublishRequest {
        id: 0,
        channel_id: "room".into(),
        event_type: "msg".into(),
        payload: b"fire-and-forget".to_vec(),
    }))
    .await
    .unwrap();
    assert!(
        eve.recv().await.is_err(),
        "fire-and-forget publish to a disallowed channel must produce no reply"
    );
}

/// S3: presence debounce. A client that drops its connection and does not
/// come back within the debounce window is reported offline to the other
/// subscriber; the test config shortens the window to make this practical.
#[tokio::test]
async fn s3_presence_offline_is_debounced() {
    let server = TestServer::spawn_with_limits(17803, 1, 1).await.unwrap();
    server
        .seed_channel("tenant-a", "lobby", false, true)
        .await
        .unwrap();
    server
        .seed_client("tenant-a", "alice", &["lobby"])
        .await
        .unwrap();
    server
        .seed_client("tenant-a", "bob", &["lobby"])
        .await
        .unwrap();

    let token_alice = sign_token(&server.token_secret, "Client", "tenant-a", "alice");
    let token_bob = sign_token(&server.token_secret, "Client", "tenant-a", "bob");

    let mut alice = TestClient::connect(&server.ws_url(), &token_alice).await.unwrap();
    alice
        .send(EnvelopePayload::Subscribe(SubscribeRequest {
            id: 1,
            channel_id: "lobby".into(),
        }))
        .await
        .unwrap();
    // A presence-enabled channel also sends the joining client its (empty,
    // for the first subscriber) initial snapshot; the Ack can arrive either
    // side of it, so match on the Ack specifically rather than assuming it's
    // the first frame.
    assert!(expect_ack(&mut alice, 1).await);

    let mut bob = TestClient::connect(&server.ws_url(), &token_bob).await.unwrap();
    bob.send(EnvelopePayload::Subscribe(SubscribeRequest {
        id: 1,
        channel_id: "lobby".into(),
    }))
    .await
    .unwrap();
    assert!(expect_ack(&mut bob, 1).await);

    let online = alice
        .recv_matching(|p| matches!(p, EnvelopePayload::OnlineStatus(u) if u.client_id == "bob"))
        .await
        .unwrap();
    match online.payload {
        EnvelopePayload::OnlineStatus(u) => assert!(u.status),
        _ => unreachable!(),
    }

    bob.close().await;

    let offline = alice
        .recv_matching(
            |p| matches!(p, EnvelopePayload::OnlineStatus(u) if u.client_id == "bob" && !u.status),
        )
        .await
        .unwrap();
    match offline.payload {
        EnvelopePayload::OnlineStatus(u) => {
            assert_eq!(u.client_id, "bob");
            assert!(!u.status);
        }
        _ => unreachable!(),
    }
}

/// S4: inactivity close. Once every subscriber leaves a channel and the
/// (shortened) inactivity timeout elapses, the channel self-destructs,
/// observable as an increment of `pulsehub_channels_closed_idle_total`.
#[tokio::test]
async fn s4_empty_channel_closes_after_inactivity_timeout() {
    let server = TestServer::spawn_with_metrics(17804, 17904, 1).await.unwrap();
    server
        .seed_channel("tenant-a", "scratch", false, false)
        .await
        .unwrap();
    server
        .seed_client("tenant-a", "alice", &["scratch"])
        .await
        .unwrap();

    let token = sign_token(&server.token_secret, "Client", "tenant-a", "alice");
    let mut alice = TestClient::connect(&server.ws_url(), &token).await.unwrap();
    alice
        .send(EnvelopePayload::Subscribe(SubscribeRequest {
            id: 1,
            channel_id: "scratch".into(),
        }))
        .await
        .unwrap();
    assert_ack_ok(alice.recv().await.unwrap(), 1);

    alice.close().await;

    let closed = wait_until(std::time::Duration::from_secs(10), || async {
        server
            .scrape_metric("pulsehub_channels_closed_idle_total")
            .await
            .map(|v| v >= 1.0)
            .unwrap_or(false)
    })
    .await;

    assert!(
        closed,
        "expected pulsehub_channels_closed_idle_total to reach at least 1"
    );
}

fn assert_ack_ok(envelope: pulsehub_wire::Envelope, expected_reply_to: u32) {
    match envelope.payload {
        EnvelopePayload::Ack(a) => {
            assert_eq!(a.reply_to, expected_reply_to);
            assert!(a.status, "expected successful ack for id {expected_reply_to}");
        }
        other => panic!("expected Ack, got {other:?}"),
    }
}

/// Find the Ack for `reply_to` among whatever else arrives (e.g. a
/// presence-channel join's own initial snapshot, which isn't ordered
/// relative to its Ack), and return its status.
async fn expect_ack(client: &mut TestClient, reply_to: u32) -> bool {
    let envelope = client
        .recv_matching(|p| matches!(p, EnvelopePayload::Ack(a) if a.reply_to == reply_to))
        .await
        .unwrap();
    match envelope.payload {
        EnvelopePayload::Ack(a) => a.status,
        _ => unreachable!(),
    }
}

/// S1 expects the delivered frame to carry the original sender and a
/// server timestamp, not just the payload -- assert the whole `ChannelEvent`.
fn assert_channel_event(envelope: &pulsehub_wire::Envelope, sender_id: &str, event_type: &str, payload: &[u8]) {
    match &envelope.payload {
        EnvelopePayload::ChannelEvent(e) => {
            assert_eq!(e.sender_id, sender_id);
            assert_eq!(e.event_type, event_type);
            assert_eq!(e.payload, payload);
            assert!(e.timestamp > 0, "expected a nonzero server timestamp");
        }
        other => panic!("expected ChannelEvent, got {other:?}"),
    }
}

async fn wait_until<F, Fut>(timeout: std::time::Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}
