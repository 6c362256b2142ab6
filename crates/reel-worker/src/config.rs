//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkerError;

/// Which backend turns uploads into published media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Local FFmpeg extraction and rendition ladder
    #[default]
    Transcode,
    /// Push to Mux and wait for the encoded asset
    Managed,
}

impl FromStr for PipelineMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transcode" => Ok(Self::Transcode),
            "managed" | "mux" => Ok(Self::Managed),
            other => Err(WorkerError::config_error(format!("unknown pipeline mode: {}", other))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs.
    ///
    /// Workspaces are keyed by media id, so two in-flight jobs for the same
    /// media cannot share a worker: the second delivery fails its attempt
    /// with a workspace error and is retried after backoff.
    pub max_concurrent_jobs: usize,
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Sleep between claims when the queue is empty
    pub poll_interval: Duration,
    /// How often a running job's lease is extended
    pub lease_heartbeat: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    pub pipeline: PipelineMode,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            work_dir: PathBuf::from("/tmp/reel"),
            poll_interval: Duration::from_millis(1000),
            lease_heartbeat: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(300),
            pipeline: PipelineMode::Transcode,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let defaults = Self::default();
        let pipeline = match std::env::var("WORKER_PIPELINE") {
            Ok(mode) => mode.parse()?,
            Err(_) => defaults.pipeline,
        };

        Ok(Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            poll_interval: std::env::var("WORKER_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            lease_heartbeat: std::env::var("WORKER_LEASE_HEARTBEAT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_heartbeat),
            shutdown_timeout: std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            pipeline,
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        })
    }
}
