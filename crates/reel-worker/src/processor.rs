//! The job processing seam between the executor and a pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use reel_models::JobEvent;
use reel_queue::{JobEventSink, QueuedJob};

use crate::error::WorkerResult;

/// Runs one delivery of a job to completion or to its first error.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Operation name used in logs.
    fn operation(&self) -> &'static str;

    async fn process(&self, job: &QueuedJob) -> WorkerResult<()>;
}

/// Best-effort progress signals for one job.
///
/// Publishing failures are logged and swallowed; nothing downstream depends
/// on these events.
#[derive(Clone)]
pub struct ProgressReporter {
    events: Arc<dyn JobEventSink>,
}

impl ProgressReporter {
    pub fn new(events: Arc<dyn JobEventSink>) -> Self {
        Self { events }
    }

    pub async fn report(&self, job: &QueuedJob, percent: u8, stage: &str) {
        let event = JobEvent::progress(job.id.clone(), percent, stage);
        if let Err(e) = self.events.publish(&event).await {
            warn!(job_id = %job.id, stage, "Failed to publish progress: {}", e);
        }
    }
}
