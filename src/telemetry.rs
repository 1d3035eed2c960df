//! Pub/sub-aware telemetry.
//!
//! Provides structured tracing spans carrying the core's domain context
//! (tenant, channel, session, event type), enabling correlation of logs
//! across admission, fan-out, presence, and bus dispatch.

#![allow(dead_code)]

use std::time::Instant;
use tracing::{Level, Span, span};

/// Pub/sub-specific trace context for structured logging.
#[derive(Debug, Clone, Default)]
pub struct PubSubTraceContext {
    /// Tenant the operation is scoped to.
    pub tenant_id: Option<String>,
    /// Channel the operation targets.
    pub channel_id: Option<String>,
    /// Session identifier (`client_id-device_id`).
    pub session_id: Option<String>,
    /// Client id of the acting party.
    pub client_id: Option<String>,
    /// Application-defined event type tag.
    pub event_type: Option<String>,
    /// Whether the acting party is admin-kind.
    pub is_admin: bool,
}

impl PubSubTraceContext {
    /// Create a new empty trace context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tenant id.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the channel id.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Set the session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the client id.
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the event type tag.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Mark the acting party as admin-kind.
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Create a tracing span from this context.
    pub fn into_span(self) -> Span {
        span!(
            Level::INFO,
            "pubsub.operation",
            tenant_id = self.tenant_id.as_deref(),
            channel_id = self.channel_id.as_deref(),
            session_id = self.session_id.as_deref(),
            client_id = self.client_id.as_deref(),
            event_type = self.event_type.as_deref(),
            is_admin = self.is_admin,
        )
    }
}

/// Guard that logs operation latency when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Elapsed time since the timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        tracing::debug!(
            operation = self.operation,
            duration_secs = self.start.elapsed().as_secs_f64(),
            "operation completed"
        );
    }
}

/// Create a span for a channel-scoped operation (subscribe, unsubscribe,
/// presence transition, inactivity check).
pub fn create_channel_span(tenant_id: &str, channel_id: &str, operation: &str) -> Span {
    span!(
        Level::DEBUG,
        "pubsub.channel",
        tenant_id = tenant_id,
        channel_id = channel_id,
        operation = operation,
    )
}

/// Create a span for a fan-out, recording the per-subscriber delivery
/// count into the metrics registry as a side effect.
pub fn create_fanout_span(tenant_id: &str, channel_id: &str, recipients: usize) -> Span {
    crate::metrics::FANOUT_DELIVERIES.inc_by(recipients as u64);

    span!(
        Level::DEBUG,
        "pubsub.fanout",
        tenant_id = tenant_id,
        channel_id = channel_id,
        recipients = recipients,
    )
}

/// Create a span for bus adapter dispatch of one inbound envelope.
pub fn create_bus_span(topic: &str, outcome: &'static str) -> Span {
    crate::metrics::BUS_INBOUND.with_label_values(&[outcome]).inc();

    span!(Level::DEBUG, "pubsub.bus", topic = topic, outcome = outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_context_builder_sets_all_fields() {
        let ctx = PubSubTraceContext::new()
            .with_tenant("tenant-1")
            .with_channel("room-1")
            .with_session("client-1-device-1")
            .with_client("client-1")
            .with_event_type("msg")
            .with_admin(false);

        assert_eq!(ctx.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(ctx.channel_id.as_deref(), Some("room-1"));
        assert_eq!(ctx.session_id.as_deref(), Some("client-1-device-1"));
        assert_eq!(ctx.client_id.as_deref(), Some("client-1"));
        assert_eq!(ctx.event_type.as_deref(), Some("msg"));
        assert!(!ctx.is_admin);
    }

    #[test]
    fn operation_timer_measures_elapsed_time() {
        let timer = OperationTimer::new("test_op");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_secs() >= 0.01);
    }
}
