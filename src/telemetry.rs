//! Telemetry logic.
//! Support logging and metrics.

use std::time::Instant;

use metrics::Unit;
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

const OPERATIONS_TOTAL: &str = "directory_operations_total";
const OPERATION_DURATION: &str = "directory_operation_duration_seconds";

/// Install a formatted tracing subscriber filtered by `RUST_LOG`
/// (default `info`).
pub fn setup_tracing() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Create recorder for Prometheus metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
    ];

    metrics::describe_counter!(
        OPERATIONS_TOTAL,
        Unit::Count,
        "Directory operations by name and outcome."
    );
    metrics::describe_histogram!(
        OPERATION_DURATION,
        Unit::Seconds,
        "Time spent in directory operations, storage included."
    );

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(OPERATION_DURATION.to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()
}

/// Record the outcome and latency of one directory operation.
pub(crate) fn track(operation: &'static str, start: Instant, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };

    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(OPERATION_DURATION, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
