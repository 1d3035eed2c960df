//! Cross-node bus envelope (§6.2): what HubChannels exchange over the
//! cross-node bus adapter. Topic naming (`"<tenant_id>:<channel_id>"`) is
//! owned by the bus adapter, not this crate.

use serde::{Deserialize, Serialize};

/// Tagged payload carried on the cross-node bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExternalPayload {
    /// A channel event published on another node.
    ChannelEvent {
        /// Client id of the original publisher.
        sender_id: String,
        /// Application-defined event type tag.
        event_type: String,
        /// Opaque application payload.
        payload: Vec<u8>,
        /// Unix-seconds timestamp assigned on the originating node.
        timestamp: i64,
    },
    /// A presence transition observed on another node.
    OnlineStatus {
        /// Client whose status changed.
        client_id: String,
        /// `true` if now online, `false` if now offline.
        status: bool,
        /// Unix-seconds timestamp of the transition.
        timestamp: i64,
    },
    /// A client gained or lost access to the channel (admin action).
    ChannelAccess {
        /// `true` to add, `false` to remove.
        add: bool,
        /// Client whose access changed.
        client_id: String,
    },
    /// A client joined or left the channel on the originating node.
    ChannelPresence {
        /// `true` for join, `false` for leave.
        join: bool,
        /// Client that joined or left.
        client_id: String,
    },
}

/// Envelope exchanged between nodes over the cross-node bus.
///
/// Carries the originating node's `server_id` so receivers can drop
/// self-echoed envelopes without consulting any other state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEnvelope {
    /// The node that originated this envelope.
    pub server_id: String,
    /// The typed payload.
    pub payload: ExternalPayload,
}

impl ExternalEnvelope {
    /// Wrap a payload with the originating node id.
    pub fn new(server_id: String, payload: ExternalPayload) -> Self {
        Self { server_id, payload }
    }

    /// Build the bus topic name for a tenant/channel pair.
    pub fn topic(tenant_id: &str, channel_id: &str) -> String {
        format!("{tenant_id}:{channel_id}")
    }

    /// Split a bus topic name back into its tenant/channel components.
    ///
    /// Channel ids themselves may not contain `:`; this is a hard
    /// precondition of topic naming, not validated here.
    pub fn parse_topic(topic: &str) -> Option<(&str, &str)> {
        topic.split_once(':')
    }
}
