//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, kind
//! - `proxy_request_duration_seconds` (histogram): latency by kind
//! - `proxy_upstream_failures_total` (counter): failures by error kind
//! - `proxy_websocket_sessions_active` (gauge): live relay sessions
//! - `proxy_websocket_messages_total` (counter): relayed messages by direction
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request. `kind` is `http`, `websocket` or `local`.
pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn upstream_failure(kind: &'static str) {
    counter!("proxy_upstream_failures_total", "kind" => kind).increment(1);
}

pub fn session_opened() {
    gauge!("proxy_websocket_sessions_active").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_websocket_sessions_active").decrement(1.0);
}

pub fn relay_message(direction: &'static str) {
    counter!("proxy_websocket_messages_total", "direction" => direction).increment(1);
}
