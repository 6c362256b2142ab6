//! Queue contract and configuration.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reel_models::JobId;

use crate::error::QueueResult;
use crate::job::{Backoff, JobOptions, JobSummary, QueuedJob, TranscodeJob};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Queue name; keys live under `reel:<name>`
    pub queue_name: String,
    /// Default attempts for enqueued jobs
    pub max_attempts: u32,
    /// Default exponential backoff base
    pub backoff_base_ms: u64,
    /// Completed jobs kept for inspection
    pub keep_completed: usize,
    /// Failed jobs kept for inspection
    pub keep_failed: usize,
    /// How long a claim is held before the job is handed out again
    pub lease: Duration,
    /// Lease expiries tolerated before a job is moved to failed
    pub max_stalled: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "transcode".to_string(),
            max_attempts: 3,
            backoff_base_ms: 1000,
            keep_completed: 100,
            keep_failed: 1000,
            lease: Duration::from_secs(600),
            max_stalled: 1,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_name: std::env::var("QUEUE_NAME").unwrap_or(defaults.queue_name),
            max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_attempts),
            backoff_base_ms: std::env::var("QUEUE_BACKOFF_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backoff_base_ms),
            keep_completed: std::env::var("QUEUE_KEEP_COMPLETED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.keep_completed),
            keep_failed: std::env::var("QUEUE_KEEP_FAILED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.keep_failed),
            lease: std::env::var("QUEUE_LEASE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease),
            max_stalled: std::env::var("QUEUE_MAX_STALLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_stalled),
        }
    }

    /// Options applied to jobs enqueued without explicit ones.
    pub fn default_job_options(&self) -> JobOptions {
        JobOptions::default()
            .with_attempts(self.max_attempts)
            .with_backoff(Backoff::Exponential {
                base_ms: self.backoff_base_ms,
            })
    }
}

/// A job handed to one worker, valid while its lease holds.
#[derive(Debug, Clone)]
pub struct Claim {
    pub job: QueuedJob,
    /// Lease token; completing or failing with a stale token is rejected
    pub token: String,
}

impl Claim {
    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }
}

/// What the queue did with a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Scheduled for another delivery after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Out of attempts; the job is permanently failed
    Exhausted { attempts: u32 },
}

/// Job counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// At-least-once work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add a job. Returns the queue-assigned id.
    async fn enqueue(&self, job: TranscodeJob, options: JobOptions) -> QueueResult<JobId>;

    /// Take the next ready job, lowest priority value first. `None` when idle.
    async fn claim(&self) -> QueueResult<Option<Claim>>;

    /// Mark a claimed job completed.
    async fn complete(&self, claim: &Claim) -> QueueResult<()>;

    /// Record a failed delivery and schedule a retry if attempts remain.
    async fn fail(&self, claim: &Claim, error: &str) -> QueueResult<FailureOutcome>;

    /// Push the lease expiry out. `false` when the lease was already lost.
    async fn extend_lease(&self, claim: &Claim) -> QueueResult<bool>;

    async fn counts(&self) -> QueueResult<QueueCounts>;

    /// Most recently completed jobs, newest first.
    async fn recent_completed(&self, limit: usize) -> QueueResult<Vec<JobSummary>>;

    /// Most recently failed jobs, newest first.
    async fn recent_failed(&self, limit: usize) -> QueueResult<Vec<JobSummary>>;
}

/// Recorded as `last_error` on a job retired for stalling.
pub const STALLED_ERROR: &str = "job stalled more than allowable limit";

/// Decide the outcome of a failed delivery.
pub(crate) fn failure_outcome(job: &QueuedJob) -> FailureOutcome {
    let attempts_made = job.attempts_made + 1;
    if attempts_made >= job.options.attempts {
        FailureOutcome::Exhausted {
            attempts: attempts_made,
        }
    } else {
        FailureOutcome::Retrying {
            attempt: attempts_made,
            delay: job.options.backoff.delay_for(attempts_made),
        }
    }
}
