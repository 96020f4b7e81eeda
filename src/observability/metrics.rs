//! Metrics collection and exposition.
//!
//! # Metrics
//! - `server_requests_total` (counter): completed requests by status
//! - `server_request_duration_seconds` (histogram): dispatch latency
//! - `server_cache_lookups_total` (counter): cache lookups by result
//! - `server_pool_rejections_total` (counter): connections refused with 503
//! - `server_active_connections` (gauge): current connection count
//! - `server_handler_failures_total` (counter): handler errors and panics by kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, started: Instant) {
    metrics::counter!("server_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("server_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("server_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_pool_rejection() {
    metrics::counter!("server_pool_rejections_total").increment(1);
}

pub fn record_handler_failure(kind: &'static str) {
    metrics::counter!("server_handler_failures_total", "kind" => kind).increment(1);
}

pub fn set_active_connections(active: u64) {
    metrics::gauge!("server_active_connections").set(active as f64);
}
