use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Install the Prometheus recorder and register application metrics.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "generation_requests_total",
        "Generation requests admitted, by route"
    );
    metrics::describe_counter!(
        "generation_requests_rejected_total",
        "Generation requests rejected before admission, by reason"
    );
    metrics::describe_counter!(
        "generation_jobs_completed_total",
        "Generation jobs that stored an image"
    );
    metrics::describe_counter!(
        "generation_jobs_failed_total",
        "Generation jobs that ended in FAILED"
    );
    metrics::describe_histogram!(
        "generation_job_seconds",
        "Time from pickup to terminal status for a generation job"
    );
    metrics::describe_gauge!(
        "generation_queue_depth",
        "Current number of jobs waiting for the browser worker"
    );

    Ok(handle)
}
