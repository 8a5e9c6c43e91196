//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): logical requests by outcome
//! - `dispatch_request_duration_seconds` (histogram): end-to-end latency
//! - `dispatch_attempts_total` (counter): attempts by backend, outcome
//! - `dispatch_attempt_duration_seconds` (histogram): per-attempt latency
//! - `dispatch_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `dispatch_circuit_transitions_total` (counter): by backend, target state
//! - `dispatch_sessions` (gauge): live sticky-session mappings

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use metrics_exporter_prometheus::PrometheusBuilder;
use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str, start: Instant) {
    ::metrics::counter!("dispatch_requests_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("dispatch_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(backend: &str, outcome: &'static str, latency: Duration) {
    ::metrics::counter!(
        "dispatch_attempts_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!("dispatch_attempt_duration_seconds", "backend" => backend.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    ::metrics::gauge!("dispatch_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_circuit_transition(backend: &str, to: CircuitState) {
    ::metrics::counter!(
        "dispatch_circuit_transitions_total",
        "backend" => backend.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_sessions(count: usize) {
    ::metrics::gauge!("dispatch_sessions").set(count as f64);
}
