//! Push notification sink (§4.10, explicitly interface-only per spec.md's
//! Non-goals: "push delivery to APNs/FCM is out of scope").
//!
//! `Hub::publish` enqueues a [`PushRequest`] for every offline member of a
//! `push`-flagged channel; what happens to that request past this trait is
//! left to the deployment.

use async_trait::async_trait;

/// A single offline-delivery request, queued by the hub when a
/// `push`-flagged channel's event reaches a member with no connected
/// sessions.
#[derive(Debug, Clone)]
pub struct PushRequest {
    /// Owning tenant.
    pub tenant_id: String,
    /// Channel the event was published on.
    pub channel_id: String,
    /// Client id the push is destined for.
    pub client_id: String,
    /// Opaque application payload, the same bytes carried in the event.
    pub payload: Vec<u8>,
}

/// Sink for outbound push requests. Out of scope beyond this interface:
/// no implementation here actually talks to APNs/FCM.
#[async_trait]
pub trait PushSink: Send + Sync {
    /// Enqueue a push request. Implementations should not block the
    /// caller on delivery; treat this as fire-and-forget from the hub's
    /// perspective.
    async fn enqueue(&self, request: PushRequest);
}

/// No-op sink for single-node setups and tests that don't configure a
/// real push integration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPushSink;

#[async_trait]
impl PushSink for NullPushSink {
    async fn enqueue(&self, request: PushRequest) {
        tracing::trace!(
            tenant_id = %request.tenant_id,
            channel_id = %request.channel_id,
            client_id = %request.client_id,
            "push request dropped: no push sink configured"
        );
    }
}
