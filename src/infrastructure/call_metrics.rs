//! Prometheus metrics for outbound calls

use crate::domain::call::TerminalReason;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with an HTTP scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(listen: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .set_buckets_for_metric(
            Matcher::Full("outbound_dial_duration_seconds".to_string()),
            &[0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0],
        )?
        .install()?;

    describe_counter!(
        "outbound_calls_total",
        "Total number of outbound calls started"
    );
    describe_histogram!(
        "outbound_dial_duration_seconds",
        "Time from dial request until answer or failure"
    );
    describe_counter!(
        "outbound_calls_terminated_total",
        "Total number of outbound calls torn down, by reason"
    );
    describe_counter!(
        "outbound_tool_invocations_total",
        "Total number of agent tool invocations, by tool"
    );

    Ok(())
}

/// Record an outbound call start
pub fn record_call_started() {
    counter!("outbound_calls_total").increment(1);
}

/// Record how long the dial attempt took
pub fn record_dial_duration(answered: bool, duration: Duration) {
    histogram!(
        "outbound_dial_duration_seconds",
        "answered" => answered.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a call teardown
pub fn record_call_terminated(reason: TerminalReason) {
    counter!("outbound_calls_terminated_total", "reason" => reason.as_str()).increment(1);
}

/// Record an agent tool invocation
pub fn record_tool_invocation(tool: &str) {
    counter!("outbound_tool_invocations_total", "tool" => tool.to_string()).increment(1);
}
