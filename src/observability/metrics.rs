//! Metrics collection and exposition.
//!
//! # Metrics
//! - `robot_pool_leases_total` (counter): sessions leased, by pool address
//! - `robot_probes_total` (counter): probe outcomes, by kind and outcome
//! - `robot_remediations_total` (counter): restarts, by kind and result
//! - `robot_panic_reports_total` (counter): crash reports, by host
//! - `robot_panic_records` (gauge): records held after the last sweep
//! - `robot_backups_total` (counter): backup runs, by kind and outcome
//! - `robot_db_live_members` (gauge): replica set members seen by the pool

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_pool_lease(address: &str) {
    counter!("robot_pool_leases_total", "pool" => address.to_string()).increment(1);
}

pub fn record_probe(kind: &'static str, outcome: &'static str) {
    counter!("robot_probes_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_remediation(kind: &'static str, success: bool) {
    let result = if success { "restarted" } else { "failed" };
    counter!("robot_remediations_total", "kind" => kind, "result" => result).increment(1);
}

pub fn record_panic_report(host: &str) {
    counter!("robot_panic_reports_total", "host" => host.to_string()).increment(1);
}

pub fn record_panic_records(count: usize) {
    gauge!("robot_panic_records").set(count as f64);
}

pub fn record_backup(kind: &'static str, outcome: &'static str) {
    counter!("robot_backups_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_live_members(count: usize) {
    gauge!("robot_db_live_members").set(count as f64);
}
