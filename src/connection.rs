//! Connection (§4.2): per-socket read/write loops. Grounded on the
//! teacher's `network/connection/event_loop.rs` unified `tokio::select!`
//! shape, with the read/write halves of a WebSocket stream standing in for
//! the teacher's zero-copy IRC transport split.
//!
//! A `Connection` does not interpret application bytes -- it only ferries
//! binary frames to and from a [`crate::session::Session`], which owns the
//! outbound sender half of the bounded queue a `Connection` drains.

use crate::auth::{Identity, TokenVerifier};
use crate::config::LimitsConfig;
use crate::hub::{ChannelDeps, HubRegistry};
use crate::session::Session;
use futures_util::{SinkExt, StreamExt};
use http::Uri;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Extracted during the WebSocket handshake, before any [`Session`] exists.
struct PendingAuth {
    token: Option<String>,
}

/// Pull a bearer token out of the handshake request: `Authorization: Bearer
/// <token>` takes precedence, falling back to a `?token=` query parameter
/// (convenient for browser clients that cannot set headers on the upgrade
/// request).
fn extract_token(request: &Request) -> Option<String> {
    if let Some(header) = request.headers().get(http::header::AUTHORIZATION) {
        if let Ok(value) = header.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    let uri: Uri = request.uri().clone();
    let query = uri.query()?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}

/// Accept one already-established TCP (or TLS-wrapped) stream: perform the
/// WebSocket upgrade, pulling a bearer token out of the handshake request,
/// verify it, then hand the socket to [`Connection::run`] paired with a
/// freshly initialized [`Session`].
///
/// Per §4.1, a handshake with a missing or invalid token never reaches the
/// hub at all -- the socket is closed before a `Session` is created.
pub async fn accept<S>(
    stream: S,
    verifier: Arc<dyn TokenVerifier>,
    registry: Arc<HubRegistry>,
    deps: Arc<ChannelDeps>,
    limits: LimitsConfig,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut pending = PendingAuth { token: None };
    let callback = |request: &Request, response: Response| {
        pending.token = extract_token(request);
        Ok(response)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;

    let Some(token) = pending.token else {
        debug!("rejecting connection: no bearer token in handshake");
        return Ok(());
    };
    let Some(identity) = verifier.verify(&token) else {
        debug!("rejecting connection: token failed verification");
        return Ok(());
    };

    let hub = registry.get_or_create(&identity.tenant_id, deps.clone());
    let (outbound_tx, outbound_rx) = mpsc::channel(limits.send_queue_capacity);
    let session = Session::init(identity, None, hub, deps, outbound_tx).await;

    Connection::run(ws_stream, session, outbound_rx, limits).await;
    Ok(())
}

/// Accept a plain-TCP connection, for use by a listener that has already
/// decided (per `ServerConfig.tls`) not to wrap the stream in TLS.
pub async fn accept_plain(
    stream: TcpStream,
    verifier: Arc<dyn TokenVerifier>,
    registry: Arc<HubRegistry>,
    deps: Arc<ChannelDeps>,
    limits: LimitsConfig,
) -> anyhow::Result<()> {
    accept(stream, verifier, registry, deps, limits).await
}

/// Runs the two cooperatively scheduled loops of one connection (§4.2),
/// collapsed into a single task via `tokio::select!` -- the same structure
/// as the teacher's unified event loop, with a WebSocket ping/pong pair
/// standing in for the teacher's IRC-level `PING`/`PONG` idle check.
pub struct Connection;

impl Connection {
    /// Drive one connection until its socket closes or a fatal I/O error
    /// occurs, then tear its session down. `session`'s `outbound` sender
    /// and `outbound_rx` here must be the two ends of the same channel.
    pub async fn run<S>(
        ws_stream: WebSocketStream<S>,
        session: Arc<Session>,
        mut outbound_rx: mpsc::Receiver<Vec<u8>>,
        limits: LimitsConfig,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut sink, mut stream) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(limits.ping_period());
        ping_interval.tick().await; // first tick fires immediately; skip it

        let mut awaiting_pong = false;
        let pong_deadline = tokio::time::sleep(limits.pong_wait());
        tokio::pin!(pong_deadline);

        loop {
            tokio::select! {
                // Read loop (§4.2): control frames are handled here and
                // never surfaced to the session; only binary frames reach
                // `on_message`.
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Binary(bytes))) => {
                            session.on_message(bytes).await;
                        }
                        Some(Ok(Message::Text(text))) => {
                            // Text and binary share the send queue on the
                            // way out; on the way in we still decode the
                            // wire codec's binary envelopes only.
                            session.on_message(text.into_bytes()).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            awaiting_pong = false;
                            session.on_heartbeat();
                        }
                        Some(Ok(Message::Ping(_))) => {
                            // tokio-tungstenite answers pings with a pong
                            // automatically on the next write; nothing to
                            // do here.
                        }
                        Some(Ok(Message::Close(_))) => break,
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(err)) => {
                            warn!(session = %session.id(), error = %err, "read error, closing connection");
                            break;
                        }
                        None => break,
                    }
                }

                // Write loop (§4.2): drains the bounded outbound queue.
                Some(bytes) = outbound_rx.recv() => {
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }

                // Write loop: issue a ping after `ping_period` of no
                // outbound ping activity.
                _ = ping_interval.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                    awaiting_pong = true;
                    pong_deadline.as_mut().reset(tokio::time::Instant::now() + limits.pong_wait());
                }

                // Write loop: `pong_wait` elapsed with no pong since the
                // last ping -- close.
                () = &mut pong_deadline, if awaiting_pong => {
                    debug!(session = %session.id(), "pong wait exceeded, closing connection");
                    break;
                }
            }
        }

        let _ = sink.close().await;
        session.close().await;
        info!(session = %session.id(), "connection closed");
    }
}
