//! Metrics collection and exposition.
//!
//! # Metrics
//! - `orchestrator_operations_total` (counter): finished operations by kind, result
//! - `orchestrator_broadcasts_total` (counter): signed transactions sent, by kind
//! - `orchestrator_confirmation_seconds` (histogram): broadcast to receipt latency
//! - `orchestrator_rpc_errors_total` (counter): failed reads by call
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Terminal result of an operation. `result` is `success`, `reverted` or an error kind.
pub fn record_operation(kind: &'static str, result: &'static str) {
    metrics::counter!("orchestrator_operations_total", "kind" => kind, "result" => result).increment(1);
}

pub fn record_broadcast(kind: &'static str) {
    metrics::counter!("orchestrator_broadcasts_total", "kind" => kind).increment(1);
}

pub fn record_confirmation(kind: &'static str, elapsed: Duration) {
    metrics::histogram!("orchestrator_confirmation_seconds", "kind" => kind).record(elapsed.as_secs_f64());
}

pub fn record_rpc_error(call: &'static str) {
    metrics::counter!("orchestrator_rpc_errors_total", "call" => call).increment(1);
}
