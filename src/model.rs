//! Core data model (§3): entities shared by the repository, cache, hub, and
//! session layers.

use serde::{Deserialize, Serialize};

/// A tenant (AppID). Owns everything else; immutable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Immutable tenant identifier.
    pub id: String,
    /// Display name (ADD, grounded on `channels/app.go`'s `App.Name`).
    pub name: String,
    /// Unix-seconds creation timestamp (ADD, grounded on `channels/app.go`).
    pub created_at: i64,
}

/// A logical end user within a [`Tenant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client id, unique within its tenant.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Channel ids this client may subscribe to or publish on.
    pub allowed_channels: Vec<String>,
}

/// Distinguishes concurrent sessions of the same client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device id, unique within its client.
    pub id: String,
    /// Owning client.
    pub client_id: String,
    /// Push token for this device, if registered.
    pub push_token: Option<String>,
}

/// Flags fixed for a channel's lifetime, except `is_closed` (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFlags {
    /// Events saved to history.
    pub persistent: bool,
    /// Not listed publicly.
    pub private: bool,
    /// Track & broadcast member online state.
    pub presence: bool,
    /// Notify offline members via push.
    pub push: bool,
    /// Publish rejected while true.
    pub is_closed: bool,
}

impl Default for ChannelFlags {
    fn default() -> Self {
        Self {
            persistent: false,
            private: false,
            presence: false,
            push: false,
            is_closed: false,
        }
    }
}

/// Channel metadata as stored by the repository/cache, independent of any
/// node-local runtime state (that's [`crate::hub::channel::HubChannel`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel id, unique within its tenant.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Fixed-for-lifetime flags, except `is_closed`.
    pub flags: ChannelFlags,
    /// Unix-seconds creation timestamp (ADD, grounded on `channels/core/channel.go`).
    pub created_at: i64,
}

/// An append-only record in a channel's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically increasing storage id, assigned by the repository.
    pub id: i64,
    /// Owning tenant.
    pub tenant_id: String,
    /// Channel this event belongs to.
    pub channel_id: String,
    /// Client id of the publisher.
    pub sender_id: String,
    /// Application-defined event type tag.
    pub event_type: String,
    /// Opaque application payload.
    pub payload: Vec<u8>,
    /// Unix-seconds timestamp.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_flags_are_all_off() {
        let flags = ChannelFlags::default();
        assert!(!flags.persistent);
        assert!(!flags.private);
        assert!(!flags.presence);
        assert!(!flags.push);
        assert!(!flags.is_closed);
    }
}
