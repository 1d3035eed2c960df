//! Shared collaborator handles a [`HubChannel`](super::channel::HubChannel)
//! needs to carry out persistence, push, and bus side-effects, grouped so
//! [`crate::hub::registry::HubRegistry`] and [`super::Hub`] can hand them
//! down without a `HubChannel -> HubRegistry -> HubChannel` cycle --
//! bundling only what channels need avoids that.

use crate::bus::SharedBus;
use crate::cache::Cache;
use crate::config::LimitsConfig;
use crate::hub::presence::PresenceTracker;
use crate::persistence::queue::PersistenceQueue;
use crate::persistence::Repository;
use crate::push::PushSink;
use std::sync::Arc;

/// Collaborators a [`super::channel::HubChannel`] needs beyond its own
/// subscriber/presence state.
pub struct ChannelDeps {
    /// This node's stable id, stamped on outbound bus envelopes.
    pub server_id: String,
    /// Read-through cache for channel metadata lookups.
    pub cache: Arc<dyn Cache>,
    /// Repository fallback for channel metadata and event history.
    pub repository: Arc<dyn Repository>,
    /// Cross-node bus adapter.
    pub bus: SharedBus,
    /// Offline push notification sink.
    pub push: Arc<dyn PushSink>,
    /// Write-behind persistence queue handle.
    pub persistence: PersistenceQueue,
    /// Node-wide presence tracker (heartbeats, per-channel device counts).
    pub presence: Arc<PresenceTracker>,
    /// Connection/timer tuning (§6.5).
    pub limits: LimitsConfig,
}
