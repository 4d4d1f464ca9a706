//! Metrics collection and export for Intercom.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CALLS_INITIATED_TOTAL: &str = "intercom_calls_initiated_total";
    pub const CALLS_ENDED_TOTAL: &str = "intercom_calls_ended_total";
    pub const CALLS_ACTIVE: &str = "intercom_calls_active";
    pub const EVENTS_TOTAL: &str = "intercom_events_total";
    pub const CLIENTS_ONLINE: &str = "intercom_clients_online";
    pub const CALL_DURATION_SECONDS: &str = "intercom_call_duration_seconds";
    pub const ERRORS_TOTAL: &str = "intercom_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CALLS_INITIATED_TOTAL,
        "Total number of calls initiated since server start"
    );
    metrics::describe_counter!(
        names::CALLS_ENDED_TOTAL,
        "Total number of calls ended, labeled by end reason"
    );
    metrics::describe_gauge!(names::CALLS_ACTIVE, "Calls currently offering or active");
    metrics::describe_counter!(
        names::EVENTS_TOTAL,
        "Total number of realtime events emitted, labeled by type"
    );
    metrics::describe_gauge!(names::CLIENTS_ONLINE, "Currently connected clients");
    metrics::describe_histogram!(
        names::CALL_DURATION_SECONDS,
        "Duration of ended calls in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an initiated call.
pub fn record_call_initiated() {
    counter!(names::CALLS_INITIATED_TOTAL).increment(1);
    gauge!(names::CALLS_ACTIVE).increment(1.0);
}

/// Record an ended call with its reason and duration.
pub fn record_call_ended(reason: &str, duration_secs: f64) {
    counter!(names::CALLS_ENDED_TOTAL, "reason" => reason.to_string()).increment(1);
    gauge!(names::CALLS_ACTIVE).decrement(1.0);
    histogram!(names::CALL_DURATION_SECONDS).record(duration_secs);
}

/// Record an emitted event.
pub fn record_event(event_type: &'static str) {
    counter!(names::EVENTS_TOTAL, "type" => event_type).increment(1);
}

/// Update the online client count.
pub fn set_clients_online(count: usize) {
    gauge!(names::CLIENTS_ONLINE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_do_not_panic() {
        record_call_initiated();
        record_call_ended("caller_hangup", 12.5);
        record_event("call_started");
        set_clients_online(3);
        record_error("store");
    }
}
