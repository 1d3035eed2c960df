//! In-process bus adapter for single-node deployments and tests.
//!
//! One `tokio::sync::broadcast` channel per topic, created lazily on first
//! subscribe or publish and retained for the process lifetime (topics are
//! per-channel and churn is bounded by the hub's own channel lifecycle, so
//! this never needs to prune dead topics).

use super::{MessageBus, Subscription};
use async_trait::async_trait;
use dashmap::DashMap;
use pulsehub_wire::ExternalEnvelope;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 256;

/// In-memory, single-node [`MessageBus`]. Every subscriber on this process
/// sees every publish; there is no other node to federate with.
pub struct LocalBus {
    topics: DashMap<String, broadcast::Sender<ExternalEnvelope>>,
}

impl LocalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<ExternalEnvelope> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn subscribe(&self, topic: &str) -> Subscription {
        let receiver = self.sender_for(topic).subscribe();
        Subscription {
            topic: topic.to_string(),
            receiver,
        }
    }

    async fn publish(&self, topic: &str, envelope: ExternalEnvelope) {
        crate::metrics::BUS_OUTBOUND.inc();
        // No receivers yet is not an error: the topic may simply have no
        // other subscribers on this node at the moment.
        let _ = self.sender_for(topic).send(envelope);
    }
}
