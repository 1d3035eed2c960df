//! Cross-node message bus (§4.8, §6.2): fans out [`ExternalEnvelope`]s
//! between nodes by topic (`"<tenant_id>:<channel_id>"`), so that a
//! HubChannel with subscribers on more than one node still sees every
//! publish regardless of which node received it.

pub mod memory;

use async_trait::async_trait;
use pulsehub_wire::ExternalEnvelope;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A bus subscription: an inbound stream of envelopes for one topic.
/// Unsubscribing is implicit -- drop the receiver.
pub struct Subscription {
    /// Topic this subscription was created for.
    pub topic: String,
    /// Receives envelopes published to the subscribed topic, including
    /// self-originated ones; callers filter those by `server_id` (§4.8's
    /// "drop self-originated envelopes" is a dispatch-layer concern, not
    /// a bus-adapter one, so every adapter delivers everything it sees).
    pub receiver: broadcast::Receiver<ExternalEnvelope>,
}

/// Cross-node bus adapter (§4.8's dispatch table operates on top of this).
///
/// Implementations own topic fan-out; this crate's own [`memory::LocalBus`]
/// is the in-process, single-node adapter. A deployment that needs true
/// cross-node delivery plugs in an adapter backed by a real broker behind
/// the same trait.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribe to a topic, receiving all future envelopes published to it.
    async fn subscribe(&self, topic: &str) -> Subscription;

    /// Publish an envelope to a topic. The envelope's `server_id` must
    /// already be set to this node's id by the caller.
    async fn publish(&self, topic: &str, envelope: ExternalEnvelope);
}

/// Convenience alias for the `Arc<dyn MessageBus>` most components hold.
pub type SharedBus = Arc<dyn MessageBus>;
