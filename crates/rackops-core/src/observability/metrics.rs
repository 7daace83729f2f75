//! Prometheus metrics
//!
//! Installs the Prometheus recorder and exposes the rendered registry for
//! each service's `GET /metrics` endpoint.
//!
//! Metrics tracked across the workspace:
//! - `rackops_poll_cycles_total` - counter of poll loop iterations by service
//! - `rackops_upstream_errors_total` - counter of upstream API failures
//! - `rackops_provision_dispatched_total` - counter of dispatched work requests
//! - `rackops_workers_busy` - gauge of provisioner workers executing a script
//! - `rackops_leases_published` - gauge of leases in the published maps
//! - `rackops_addresses_allocated` - gauge of MAC-bound addresses

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register metric descriptions.
///
/// Safe to call once per process; a second call is a no-op.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle);

    describe_counter!(
        "rackops_poll_cycles_total",
        "Number of poll loop iterations"
    );
    describe_counter!(
        "rackops_upstream_errors_total",
        "Number of upstream API failures"
    );
    describe_counter!(
        "rackops_provision_dispatched_total",
        "Number of work requests handed to the dispatcher"
    );
    describe_gauge!(
        "rackops_workers_busy",
        "Number of workers currently executing a provisioning script"
    );
    describe_gauge!(
        "rackops_leases_published",
        "Number of leases in the published lease maps"
    );
    describe_gauge!(
        "rackops_addresses_allocated",
        "Number of addresses currently bound to a MAC"
    );

    Ok(())
}

/// Render the current registry in the Prometheus exposition format.
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Record one poll loop iteration for a service.
pub fn record_poll_cycle(service: &'static str) {
    counter!("rackops_poll_cycles_total", "service" => service).increment(1);
}

/// Record an upstream API failure.
pub fn record_upstream_error(service: &'static str, upstream: &'static str) {
    counter!("rackops_upstream_errors_total", "service" => service, "upstream" => upstream)
        .increment(1);
}

/// Record a work request handed to the dispatcher.
pub fn record_dispatch() {
    counter!("rackops_provision_dispatched_total").increment(1);
}

/// Adjust the busy-worker gauge.
pub fn worker_busy(delta: f64) {
    gauge!("rackops_workers_busy").increment(delta);
}

/// Update the published-lease gauge.
pub fn set_leases_published(count: usize) {
    gauge!("rackops_leases_published").set(count as f64);
}

/// Update the allocated-address gauge.
pub fn set_addresses_allocated(count: usize) {
    gauge!("rackops_addresses_allocated").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_poll_cycle("test");
        record_upstream_error("test", "maas");
        record_dispatch();
        worker_busy(1.0);
        set_leases_published(3);
        set_addresses_allocated(2);
    }
}
