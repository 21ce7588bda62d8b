//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, sessions, stream events)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by bridge, status
//! - `gateway_request_duration_seconds` (histogram): latency per bridge
//! - `gateway_active_sessions` (gauge): open streaming sessions
//! - `gateway_sessions_closed_total` (counter): closed sessions by reason
//! - `gateway_stream_events_total` (counter): SSE events by kind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels for bridge, status code and session outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed HTTP request on `bridge`.
pub fn record_request(bridge: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "bridge" => bridge,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "bridge" => bridge)
        .record(start.elapsed().as_secs_f64());
}

pub fn session_opened() {
    ::metrics::gauge!("gateway_active_sessions").increment(1.0);
}

pub fn session_closed(reason: &'static str) {
    ::metrics::gauge!("gateway_active_sessions").decrement(1.0);
    ::metrics::counter!("gateway_sessions_closed_total", "reason" => reason).increment(1);
}

/// Count an SSE event (`message` or `system`).
pub fn record_stream_event(kind: &'static str) {
    ::metrics::counter!("gateway_stream_events_total", "kind" => kind).increment(1);
}
