//! Client-facing wire types (§6.1 of the protocol): every application frame
//! is an [`Envelope`] whose [`EnvelopePayload`] variant names the frame type.

use serde::{Deserialize, Serialize};

/// A tagged, type-specific payload carried over the client socket.
///
/// Each variant corresponds to one of the wire frame types
/// `{ PUBLISH, SUBSCRIBE, ACK, NEW_CHANNEL, REMOVE_CHANNEL, ONLINE_STATUS,
/// INITIAL_ONLINE_STATUS, JOIN_CHANNEL, LEAVE_CHANNEL }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvelopePayload {
    /// Client asks to subscribe to a channel.
    Subscribe(SubscribeRequest),
    /// Client publishes an event.
    Publish(PublishRequest),
    /// Server delivers a published event, wrapped in PUBLISH per §6.1.
    ChannelEvent(ChannelEventPayload),
    /// Server acknowledges a Subscribe or Publish carrying a non-zero id.
    Ack(Ack),
    /// Server informs the client it gained access to a channel.
    NewChannel(String),
    /// Server informs the client it lost access to a channel.
    RemoveChannel(String),
    /// Server informs the client of a single presence transition.
    OnlineStatus(OnlineStatusUpdate),
    /// Server sends the full presence snapshot for a channel just joined.
    InitialOnlineStatus(InitialPresenceStatus),
    /// Server informs the client that a peer joined a channel.
    JoinChannel(ClientJoin),
    /// Server informs the client that a peer left a channel.
    LeaveChannel(ClientLeave),
}

/// Envelope wrapping one application frame.
///
/// `Envelope` itself carries no extra framing fields beyond the payload:
/// the frame type is the payload's enum discriminant, matching the spec's
/// `{ type, payload }` shape without needing a separate `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The typed payload carried by this frame.
    pub payload: EnvelopePayload,
}

impl Envelope {
    /// Wrap a payload in an envelope.
    pub fn new(payload: EnvelopePayload) -> Self {
        Self { payload }
    }
}

/// `{ id, channel_id }` — request to subscribe to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Correlation id echoed back in the Ack. Always non-zero for Subscribe.
    pub id: u32,
    /// Channel being subscribed to.
    pub channel_id: String,
}

/// `{ id, channel_id, event_type, payload }` — publish an event, client or
/// server side. `id == 0` marks fire-and-forget: no Ack, no persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Correlation id; 0 means fire-and-forget.
    pub id: u32,
    /// Target channel.
    pub channel_id: String,
    /// Application-defined event type tag.
    pub event_type: String,
    /// Opaque application payload.
    pub payload: Vec<u8>,
}

/// `{ reply_to, status }` — outcome of a Subscribe or Publish with `id != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Echoes the request's `id`.
    pub reply_to: u32,
    /// Whether the request succeeded.
    pub status: bool,
}

/// `{ sender_id, event_type, payload, channel_id, timestamp }` — server to
/// client, wrapped in a Publish envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEventPayload {
    /// Client id of the original publisher.
    pub sender_id: String,
    /// Application-defined event type tag.
    pub event_type: String,
    /// Opaque application payload.
    pub payload: Vec<u8>,
    /// Channel the event belongs to.
    pub channel_id: String,
    /// Unix-seconds server timestamp at publish time.
    pub timestamp: i64,
}

/// `{ channel_id, client_id, status, timestamp }` — one presence transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineStatusUpdate {
    /// Channel the transition applies to.
    pub channel_id: String,
    /// Client whose status changed.
    pub client_id: String,
    /// `true` if now online, `false` if now offline.
    pub status: bool,
    /// Unix-seconds server timestamp of the transition.
    pub timestamp: i64,
}

/// One client's presence entry inside an [`InitialPresenceStatus`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    /// Whether the client is currently online.
    pub status: bool,
    /// Unix-seconds timestamp of that status.
    pub timestamp: i64,
}

/// `{ channel_id, client_status }` — full presence snapshot sent to a
/// client on join, excluding the joining client itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialPresenceStatus {
    /// Channel this snapshot describes.
    pub channel_id: String,
    /// Per-client presence status at snapshot time.
    pub client_status: std::collections::HashMap<String, PresenceStatus>,
}

/// `{ channel_id, client_id }` — a peer joined the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientJoin {
    /// Channel that was joined.
    pub channel_id: String,
    /// Client that joined.
    pub client_id: String,
}

/// `{ channel_id, client_id }` — a peer left the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLeave {
    /// Channel that was left.
    pub channel_id: String,
    /// Client that left.
    pub client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode};

    #[test]
    fn ack_round_trips() {
        let envelope = Envelope::new(EnvelopePayload::Ack(Ack {
            reply_to: 42,
            status: true,
        }));
        let bytes = encode(&envelope).unwrap();
        assert_eq!(decode::<Envelope>(&bytes).unwrap(), envelope);
    }

    #[test]
    fn initial_presence_status_round_trips_with_empty_map() {
        let envelope = Envelope::new(EnvelopePayload::InitialOnlineStatus(
            InitialPresenceStatus {
                channel_id: "C".into(),
                client_status: Default::default(),
            },
        ));
        let bytes = encode(&envelope).unwrap();
        assert_eq!(decode::<Envelope>(&bytes).unwrap(), envelope);
    }

    #[test]
    fn channel_event_round_trips_with_sender_and_timestamp() {
        let envelope = Envelope::new(EnvelopePayload::ChannelEvent(ChannelEventPayload {
            sender_id: "alice".into(),
            event_type: "msg".into(),
            payload: b"hi".to_vec(),
            channel_id: "room".into(),
            timestamp: 1_700_000_000,
        }));
        let bytes = encode(&envelope).unwrap();
        assert_eq!(decode::<Envelope>(&bytes).unwrap(), envelope);
    }

    #[test]
    fn fire_and_forget_publish_has_zero_id() {
        let req = PublishRequest {
            id: 0,
            channel_id: "C".into(),
            event_type: "msg".into(),
            payload: vec![1, 2, 3],
        };
        assert_eq!(req.id, 0);
    }
}
