//! Prometheus Metrics Module
//!
//! # Metrics Collected
//! - Connected realtime clients
//! - Hub deliveries by event type
//! - Clients evicted for falling behind
//! - Cache-aside lookups by entity and outcome

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Connected realtime clients
pub static REALTIME_CLIENTS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("realtime_clients_active", "Number of registered realtime clients")
            .namespace("chat_hub"),
    )
    .expect("Failed to create REALTIME_CLIENTS_ACTIVE metric")
});

/// Frames enqueued to client buffers, by event type
pub static HUB_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("hub_deliveries_total", "Frames enqueued onto client buffers")
            .namespace("chat_hub"),
        &["event"],
    )
    .expect("Failed to create HUB_DELIVERIES_TOTAL metric")
});

/// Clients evicted because their outbound buffer was full
pub static HUB_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("hub_evictions_total", "Clients evicted for a full outbound buffer")
            .namespace("chat_hub"),
    )
    .expect("Failed to create HUB_EVICTIONS_TOTAL metric")
});

/// Cache-aside lookups, by entity and result (hit, miss, error)
pub static CACHE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cache_requests_total", "Cache-aside lookups").namespace("chat_hub"),
        &["entity", "result"],
    )
    .expect("Failed to create CACHE_REQUESTS_TOTAL metric")
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(REALTIME_CLIENTS_ACTIVE.clone()))
        .expect("Failed to register REALTIME_CLIENTS_ACTIVE");
    registry
        .register(Box::new(HUB_DELIVERIES_TOTAL.clone()))
        .expect("Failed to register HUB_DELIVERIES_TOTAL");
    registry
        .register(Box::new(HUB_EVICTIONS_TOTAL.clone()))
        .expect("Failed to register HUB_EVICTIONS_TOTAL");
    registry
        .register(Box::new(CACHE_REQUESTS_TOTAL.clone()))
        .expect("Failed to register CACHE_REQUESTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn set_realtime_clients(count: usize) {
    REALTIME_CLIENTS_ACTIVE.set(count as i64);
}

pub fn record_deliveries(event: &str, delivered: usize) {
    if delivered > 0 {
        HUB_DELIVERIES_TOTAL
            .with_label_values(&[event])
            .inc_by(delivered as u64);
    }
}

pub fn record_eviction() {
    HUB_EVICTIONS_TOTAL.inc();
}

pub fn record_cache_lookup(entity: &str, result: &str) {
    CACHE_REQUESTS_TOTAL
        .with_label_values(&[entity, result])
        .inc();
}
