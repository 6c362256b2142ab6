//! Queue signal events.
//!
//! Published for observability; nothing in the pipeline depends on them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Progress,
    Completed,
    Failed,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventKind::Progress => "progress",
            JobEventKind::Completed => "completed",
            JobEventKind::Failed => "failed",
        }
    }
}

/// A job lifecycle signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Stage progress (0-100)
    Progress {
        #[serde(rename = "jobId")]
        job_id: JobId,
        percent: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Terminal success
    Completed {
        #[serde(rename = "jobId")]
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },

    /// Terminal failure carrying the last error
    Failed {
        #[serde(rename = "jobId")]
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn progress(job_id: JobId, percent: u8, stage: impl Into<String>) -> Self {
        JobEvent::Progress {
            job_id,
            percent: percent.min(100),
            stage: Some(stage.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job_id: JobId) -> Self {
        JobEvent::Completed {
            job_id,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        JobEvent::Failed {
            job_id,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobEventKind {
        match self {
            JobEvent::Progress { .. } => JobEventKind::Progress,
            JobEvent::Completed { .. } => JobEventKind::Completed,
            JobEvent::Failed { .. } => JobEventKind::Failed,
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }
}
