//! Lightweight metrics helpers for Portico.
//!
//! This module wraps the `metrics` crate macros with gateway-specific
//! metric names. It intentionally avoids embedding a concrete exporter (the
//! application can initialize any compatible recorder externally) while
//! still documenting and describing the metric families.
//!
//! Provided metrics (labels vary by family):
//! * `portico_requests_total` (counter)
//! * `portico_request_duration_seconds` (histogram)
//! * `portico_upstream_requests_total` (counter)
//! * `portico_upstream_request_duration_seconds` (histogram)
//! * `portico_upstream_health_status` (gauge per upstream)
//! * `portico_breaker_opened_total` (counter per upstream)
use std::{collections::HashMap, sync::Mutex};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const PORTICO_REQUESTS_TOTAL: &str = "portico_requests_total";
pub const PORTICO_REQUEST_DURATION_SECONDS: &str = "portico_request_duration_seconds";
pub const PORTICO_UPSTREAM_REQUESTS_TOTAL: &str = "portico_upstream_requests_total";
pub const PORTICO_UPSTREAM_REQUEST_DURATION_SECONDS: &str =
    "portico_upstream_request_duration_seconds";
pub const PORTICO_UPSTREAM_HEALTH_STATUS: &str = "portico_upstream_health_status";
pub const PORTICO_BREAKER_OPENED_TOTAL: &str = "portico_breaker_opened_total";

/// Storage for upstream health gauge values, kept so `/health` style
/// snapshots don't depend on the installed recorder.
pub static UPSTREAM_HEALTH_GAUGES: Lazy<Mutex<HashMap<String, f64>>> = Lazy::new(|| {
    describe_counter!(
        PORTICO_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        PORTICO_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        PORTICO_UPSTREAM_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to upstream services."
    );
    describe_histogram!(
        PORTICO_UPSTREAM_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests forwarded to upstream services."
    );
    describe_gauge!(
        PORTICO_UPSTREAM_HEALTH_STATUS,
        "Health status of individual upstreams (1 for healthy, 0 for unhealthy)."
    );
    describe_counter!(
        PORTICO_BREAKER_OPENED_TOTAL,
        Unit::Count,
        "Number of times a circuit breaker transitioned to open."
    );

    Mutex::new(HashMap::new())
});

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    Lazy::force(&UPSTREAM_HEALTH_GAUGES);
    tracing::info!("Portico metrics descriptions registered");
    Ok(())
}

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(method: &str, status: u16, upstream: Option<&str>) {
    counter!(
        PORTICO_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "upstream" => upstream.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(method: &str, duration: std::time::Duration) {
    histogram!(
        PORTICO_REQUEST_DURATION_SECONDS,
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment total count of forwarded upstream requests.
pub fn increment_upstream_request_total(upstream: &str, method: &str, status: u16) {
    counter!(
        PORTICO_UPSTREAM_REQUESTS_TOTAL,
        "upstream" => upstream.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed upstream call's duration.
pub fn record_upstream_request_duration(upstream: &str, duration: std::time::Duration) {
    histogram!(
        PORTICO_UPSTREAM_REQUEST_DURATION_SECONDS,
        "upstream" => upstream.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set (and record) the health status gauge for an upstream.
pub fn set_upstream_health_status(upstream: &str, is_healthy: bool) {
    let health_value = if is_healthy { 1.0 } else { 0.0 };

    if let Ok(mut gauges) = UPSTREAM_HEALTH_GAUGES.lock() {
        gauges.insert(upstream.to_string(), health_value);
    } else {
        tracing::error!("Failed to acquire lock for upstream health gauges");
        return;
    }

    gauge!(PORTICO_UPSTREAM_HEALTH_STATUS, "upstream" => upstream.to_string()).set(health_value);
}

/// Count a breaker transition to open.
pub fn increment_breaker_opened(upstream: &str) {
    counter!(PORTICO_BREAKER_OPENED_TOTAL, "upstream" => upstream.to_string()).increment(1);
}
