//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_events_total` (counter): command events by circuit, event
//! - `circuit_command_duration_seconds` (histogram): end-to-end command latency
//! - `circuit_run_duration_seconds` (histogram): time inside the wrapped work
//! - `circuit_open` (gauge): 1=open, 0=closed
//! - `circuit_pool_in_use` (gauge): tickets currently held
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for circuit and event kind only
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Duration;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_command_event(circuit: &str, event: &'static str, elapsed: Duration) {
    ::metrics::counter!(
        "circuit_events_total",
        "circuit" => circuit.to_string(),
        "event" => event
    )
    .increment(1);
    ::metrics::histogram!(
        "circuit_command_duration_seconds",
        "circuit" => circuit.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_run_duration(circuit: &str, run: Duration) {
    ::metrics::histogram!(
        "circuit_run_duration_seconds",
        "circuit" => circuit.to_string()
    )
    .record(run.as_secs_f64());
}

pub fn record_circuit_open(circuit: &str, open: bool) {
    ::metrics::gauge!("circuit_open", "circuit" => circuit.to_string())
        .set(if open { 1.0 } else { 0.0 });
}

pub fn record_pool_in_use(circuit: &str, in_use: usize) {
    ::metrics::gauge!("circuit_pool_in_use", "circuit" => circuit.to_string())
        .set(in_use as f64);
}
