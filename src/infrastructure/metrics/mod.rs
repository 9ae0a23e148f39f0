//! Prometheus Metrics Module
//!
//! Provides hub-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket connections on this server
//! - Routed messages by route (direct, broadcast, heartbeat, ignored)
//! - Connections evicted because their outbound queue was full
//! - Offline messages stored by backend and outcome
//! - Inbound frames that failed to decode

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "notify_hub";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Connections currently held in the registry
pub static CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of registered WebSocket connections",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create CONNECTIONS_ACTIVE metric")
});

/// Inbound messages by routing decision
pub static MESSAGES_ROUTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_routed_total", "Total number of routed client messages")
            .namespace(NAMESPACE),
        &["route"], // "direct", "broadcast", "heartbeat", "ignored"
    )
    .expect("Failed to create MESSAGES_ROUTED_TOTAL metric")
});

/// Slow consumers dropped by the registry
pub static CONNECTIONS_EVICTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "connections_evicted_total",
            "Connections evicted because their outbound queue was full",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create CONNECTIONS_EVICTED_TOTAL metric")
});

/// Offline writes by backend and outcome
pub static OFFLINE_MESSAGES_STORED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "offline_messages_stored_total",
            "Total number of offline message writes",
        )
        .namespace(NAMESPACE),
        &["backend", "outcome"], // "cache" | "log", "ok" | "error"
    )
    .expect("Failed to create OFFLINE_MESSAGES_STORED_TOTAL metric")
});

/// Frames dropped before routing
pub static FRAMES_REJECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "frames_rejected_total",
            "Inbound frames that could not be decoded",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create FRAMES_REJECTED_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(MESSAGES_ROUTED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_ROUTED_TOTAL");
    registry
        .register(Box::new(CONNECTIONS_EVICTED_TOTAL.clone()))
        .expect("Failed to register CONNECTIONS_EVICTED_TOTAL");
    registry
        .register(Box::new(OFFLINE_MESSAGES_STORED_TOTAL.clone()))
        .expect("Failed to register OFFLINE_MESSAGES_STORED_TOTAL");
    registry
        .register(Box::new(FRAMES_REJECTED_TOTAL.clone()))
        .expect("Failed to register FRAMES_REJECTED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to update the registered connection count
pub fn set_active_connections(count: usize) {
    CONNECTIONS_ACTIVE.set(count as i64);
}

/// Helper to count a routing decision
pub fn record_route(route: &str) {
    MESSAGES_ROUTED_TOTAL.with_label_values(&[route]).inc();
}

/// Helper to count evictions
pub fn record_evictions(count: usize) {
    CONNECTIONS_EVICTED_TOTAL.inc_by(count as u64);
}

/// Helper to record an offline write
pub fn record_offline_store(backend: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    OFFLINE_MESSAGES_STORED_TOTAL
        .with_label_values(&[backend, outcome])
        .inc();
}

/// Helper to count an undecodable frame
pub fn record_rejected_frame() {
    FRAMES_REJECTED_TOTAL.inc();
}
