//! Prometheus metrics for the worker.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "reel_jobs_total";
    pub const ARTIFACTS_PUBLISHED_TOTAL: &str = "reel_artifacts_published_total";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";
}

/// Install the Prometheus recorder and serve it on `0.0.0.0:<port>`.
pub fn init_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a finished delivery. `outcome` is `completed`, `retrying` or `failed`.
pub fn record_job(outcome: &'static str) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_artifact_published(role: &'static str) {
    counter!(names::ARTIFACTS_PUBLISHED_TOTAL, "role" => role).increment(1);
}

pub fn record_stage_duration(stage: &'static str, elapsed: Duration) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(elapsed.as_secs_f64());
}
