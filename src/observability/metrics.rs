//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_reconfigurations_total` (counter): reconfigurations by outcome
//! - `balancer_dialer_errors_total` (counter): chained servers that failed to build
//! - `balancer_retired_total` (counter): superseded balancers closed
//! - `client_tunnels_total` (counter): local CONNECT requests by result
//! - `client_active_tunnels` (gauge): tunnels currently open
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is optional and runs its own HTTP listener

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reconfiguration(outcome: &'static str) {
    counter!("balancer_reconfigurations_total", "outcome" => outcome).increment(1);
}

pub fn record_dialer_error() {
    counter!("balancer_dialer_errors_total").increment(1);
}

pub fn record_retired() {
    counter!("balancer_retired_total").increment(1);
}

pub fn record_tunnel(result: &'static str) {
    counter!("client_tunnels_total", "result" => result).increment(1);
}

pub fn record_active_tunnels(count: u64) {
    gauge!("client_active_tunnels").set(count as f64);
}
