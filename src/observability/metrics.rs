//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_redirects_total` (counter): plaintext requests redirected
//! - `proxy_tls_handshakes_total` (counter): handshakes by outcome
//! - `proxy_active_connections` (gauge): client connections and bridges
//! - `proxy_ws_bridges_total` (counter): finished bridges by end reason
//! - `proxy_ws_active_bridges` (gauge): open bridges
//! - `proxy_backend_in_flight` (gauge): requests in flight per backend
//! - `proxy_tls_session_cache_bytes` (gauge): resumption cache occupancy
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &'static str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_redirect() {
    counter!("proxy_redirects_total").increment(1);
}

pub fn record_tls_handshake(outcome: &'static str) {
    counter!("proxy_tls_handshakes_total", "outcome" => outcome).increment(1);
}

pub fn record_active_connections(count: u64) {
    gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_bridge_opened() {
    gauge!("proxy_ws_active_bridges").increment(1.0);
}

pub fn record_bridge_closed(end: &'static str) {
    gauge!("proxy_ws_active_bridges").decrement(1.0);
    counter!("proxy_ws_bridges_total", "end" => end).increment(1);
}

pub fn record_backend_in_flight(backend: &'static str, count: usize) {
    gauge!("proxy_backend_in_flight", "backend" => backend).set(count as f64);
}

pub fn record_session_cache(bytes: usize) {
    gauge!("proxy_tls_session_cache_bytes").set(bytes as f64);
}
