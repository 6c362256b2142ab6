//! Job types for the queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_models::{JobId, JobState, MediaId};

/// Raw upload bytes travel base64-encoded inside the JSON envelope.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Job to split an upload into tracks and renditions and publish them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Raw uploaded file
    #[serde(with = "base64_bytes")]
    pub file: Vec<u8>,
    /// Declared MIME type of the upload
    pub mimetype: String,
    /// Owning media entity
    #[serde(rename = "videoId")]
    pub video_id: MediaId,
}

impl TranscodeJob {
    /// Job name stored on the envelope.
    pub const NAME: &'static str = "transcode";

    pub fn new(file: Vec<u8>, mimetype: impl Into<String>, video_id: MediaId) -> Self {
        Self {
            file,
            mimetype: mimetype.into(),
            video_id,
        }
    }

    /// File extension implied by the declared MIME type.
    pub fn file_extension(&self) -> &'static str {
        match self.mimetype.as_str() {
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/webm" => "webm",
            "video/x-matroska" => "mkv",
            "audio/mpeg" => "mp3",
            "audio/mp4" | "audio/x-m4a" => "m4a",
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/ogg" => "ogg",
            _ => "bin",
        }
    }
}

/// Retry delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// `base_ms × 2^(k-1)` after the k-th failed attempt
    Exponential { base_ms: u64 },
    /// Same delay after every failure
    Fixed { delay_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential { base_ms: 1000 }
    }
}

impl Backoff {
    /// Delay before redelivery after `attempts_made` failed attempts.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        match *self {
            Self::Exponential { base_ms } => {
                let exponent = attempts_made.saturating_sub(1).min(32);
                Duration::from_millis(base_ms.saturating_mul(1u64 << exponent))
            }
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
        }
    }
}

/// Highest accepted priority value. The Redis wait score is
/// `priority × 2^32 + seq` held in an f64, which stays exact below 2^53.
pub const MAX_PRIORITY: u32 = 1 << 21;

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Lower runs first; `0` is highest, capped at [`MAX_PRIORITY`]
    #[serde(default)]
    pub priority: u32,
    /// Initial scheduling delay in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
    /// Total deliveries allowed, including the first
    pub attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay_ms: 0,
            attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl JobOptions {
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// A job as stored by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub name: String,
    pub payload: TranscodeJob,
    pub options: JobOptions,
    /// Failed attempts so far; kept outside the envelope by the Redis queue
    #[serde(default)]
    pub attempts_made: u32,
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(payload: TranscodeJob, mut options: JobOptions) -> Self {
        // Options can arrive deserialized, bypassing `with_priority`
        options.priority = options.priority.min(MAX_PRIORITY);
        Self {
            id: JobId::new(),
            name: TranscodeJob::NAME.to_string(),
            payload,
            options,
            attempts_made: 0,
            created_at: Utc::now(),
        }
    }

    /// 1-based number of the delivery in progress.
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    /// Whether a failure of the current delivery is the last one allowed.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt() >= self.options.attempts
    }
}

/// History entry for a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub state: JobState,
    pub attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
