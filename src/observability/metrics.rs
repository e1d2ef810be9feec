//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define portal metrics (requests, rejections, backend calls)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `portal_requests_total` (counter): requests by endpoint, method, status
//! - `portal_request_duration_seconds` (histogram): request latency by endpoint
//! - `portal_rate_limited_total` (counter): attempts refused by the limiter
//! - `portal_rate_limit_entries` (gauge): identifiers currently tracked
//! - `portal_backend_calls_total` (counter): platform calls by operation, outcome
//! - `portal_backend_call_duration_seconds` (histogram): platform call latency
//! - `portal_share_links_total` (counter): share link actions
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels are bounded: endpoints are route templates, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Count and time a finished request. `endpoint` is the matched route template.
pub fn record_request(endpoint: &str, method: &str, status: u16, start: Instant) {
    let endpoint = endpoint.to_string();
    counter!(
        "portal_requests_total",
        "endpoint" => endpoint.clone(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("portal_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(endpoint: &'static str) {
    counter!("portal_rate_limited_total", "endpoint" => endpoint).increment(1);
}

pub fn record_rate_limit_entries(count: usize) {
    gauge!("portal_rate_limit_entries").set(count as f64);
}

/// Count and time a call to the data platform.
pub fn record_backend_call(operation: &'static str, outcome: &'static str, start: Instant) {
    counter!(
        "portal_backend_calls_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("portal_backend_call_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

/// Count a share link action (create, validate, revoke, download).
pub fn record_share_link(action: &'static str, outcome: &'static str) {
    counter!(
        "portal_share_links_total",
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
}
