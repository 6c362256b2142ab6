//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use reel_models::{JobId, MediaId};

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job ID, the owning media ID and the operation.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    media_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger.
    ///
    /// # Arguments
    /// * `job_id` - The queue-assigned job identifier
    /// * `media_id` - The media record the job publishes into
    /// * `operation` - The type of operation (e.g., "transcode", "managed")
    pub fn new(job_id: &JobId, media_id: &MediaId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            media_id: media_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            media_id = %self.media_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            media_id = %self.media_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            media_id = %self.media_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            media_id = %self.media_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job operation.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            media_id = %self.media_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            media_id = %self.media_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let media_id = MediaId::from("m1");
        let logger = JobLogger::new(&job_id, &media_id, "transcode");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.media_id(), "m1");
        assert_eq!(logger.operation(), "transcode");
    }

    #[test]
    fn test_logging_does_not_panic() {
        let logger = JobLogger::new(&JobId::new(), &MediaId::from("m1"), "transcode");
        let _span = logger.create_span().entered();
        logger.log_start("staged");
        logger.log_progress("probed");
        logger.log_warning("slow upload");
        logger.log_error("probe failed");
        logger.log_completion("published 5 artifacts");
    }
}
