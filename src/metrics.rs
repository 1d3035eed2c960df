//! Prometheus metrics registry for pulsehub-node.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Process-wide metrics registry, scraped by `http::metrics_handler`.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total events published across all channels (local origin only).
    pub static ref EVENTS_PUBLISHED: IntCounter = IntCounter::new(
        "pulsehub_events_published_total",
        "Total events published by locally connected sessions"
    ).expect("metric can be created");

    /// Total per-subscriber deliveries, summed across all publish paths.
    pub static ref FANOUT_DELIVERIES: IntCounter = IntCounter::new(
        "pulsehub_fanout_deliveries_total",
        "Total per-subscriber frame deliveries"
    ).expect("metric can be created");

    /// Total envelopes received from the cross-node bus.
    pub static ref BUS_INBOUND: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "pulsehub_bus_inbound_total",
            "Envelopes received from the cross-node bus, by dispatch outcome"
        ),
        &["outcome"],
    ).expect("metric can be created");

    /// Total envelopes emitted to the cross-node bus.
    pub static ref BUS_OUTBOUND: IntCounter = IntCounter::new(
        "pulsehub_bus_outbound_total",
        "Envelopes emitted to the cross-node bus"
    ).expect("metric can be created");

    /// Currently connected sessions across all tenants.
    pub static ref CONNECTED_SESSIONS: IntGauge = IntGauge::new(
        "pulsehub_connected_sessions",
        "Currently connected sessions"
    ).expect("metric can be created");

    /// Currently live HubChannels across all tenants.
    pub static ref ACTIVE_CHANNELS: IntGauge = IntGauge::new(
        "pulsehub_active_channels",
        "HubChannels currently held in memory"
    ).expect("metric can be created");

    /// Presence transitions emitted (online or offline), by direction.
    pub static ref PRESENCE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "pulsehub_presence_transitions_total",
            "Presence transitions emitted, by direction"
        ),
        &["direction"],
    ).expect("metric can be created");

    /// Records currently buffered in the write-behind persistence queue.
    pub static ref PERSISTENCE_QUEUE_DEPTH: IntGauge = IntGauge::new(
        "pulsehub_persistence_queue_depth",
        "Records currently buffered in the write-behind persistence queue"
    ).expect("metric can be created");

    /// Batches flushed to the repository, by trigger (size or timeout).
    pub static ref PERSISTENCE_BATCHES_FLUSHED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "pulsehub_persistence_batches_flushed_total",
            "Persistence batches flushed, by trigger"
        ),
        &["trigger"],
    ).expect("metric can be created");

    /// HubChannels removed after 15 minutes of zero subscribers.
    pub static ref CHANNELS_CLOSED_IDLE: IntCounter = IntCounter::new(
        "pulsehub_channels_closed_idle_total",
        "HubChannels removed due to prolonged zero-subscriber inactivity"
    ).expect("metric can be created");

    /// Subscribe/Publish requests rejected at admission (not admissible).
    pub static ref ADMISSION_REJECTED: IntCounter = IntCounter::new(
        "pulsehub_admission_rejected_total",
        "Subscribe/Publish requests rejected because the client lacked access"
    ).expect("metric can be created");
}

/// Register all metrics into [`REGISTRY`]. Call once at startup.
pub fn init() {
    REGISTRY
        .register(Box::new(EVENTS_PUBLISHED.clone()))
        .expect("register events_published");
    REGISTRY
        .register(Box::new(FANOUT_DELIVERIES.clone()))
        .expect("register fanout_deliveries");
    REGISTRY
        .register(Box::new(BUS_INBOUND.clone()))
        .expect("register bus_inbound");
    REGISTRY
        .register(Box::new(BUS_OUTBOUND.clone()))
        .expect("register bus_outbound");
    REGISTRY
        .register(Box::new(CONNECTED_SESSIONS.clone()))
        .expect("register connected_sessions");
    REGISTRY
        .register(Box::new(ACTIVE_CHANNELS.clone()))
        .expect("register active_channels");
    REGISTRY
        .register(Box::new(PRESENCE_TRANSITIONS.clone()))
        .expect("register presence_transitions");
    REGISTRY
        .register(Box::new(PERSISTENCE_QUEUE_DEPTH.clone()))
        .expect("register persistence_queue_depth");
    REGISTRY
        .register(Box::new(PERSISTENCE_BATCHES_FLUSHED.clone()))
        .expect("register persistence_batches_flushed");
    REGISTRY
        .register(Box::new(CHANNELS_CLOSED_IDLE.clone()))
        .expect("register channels_closed_idle");
    REGISTRY
        .register(Box::new(ADMISSION_REJECTED.clone()))
        .expect("register admission_rejected");
}

/// Gather the registry into Prometheus text exposition format.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    String::from_utf8(buffer).expect("metrics are valid utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_published_counter_increments() {
        let before = EVENTS_PUBLISHED.get();
        EVENTS_PUBLISHED.inc();
        assert_eq!(EVENTS_PUBLISHED.get(), before + 1);
    }
}
