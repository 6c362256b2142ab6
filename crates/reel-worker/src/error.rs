//! Worker error types.
//!
//! Every variant aborts the current delivery; the queue's retry policy
//! decides whether the job runs again.

use thiserror::Error;

use reel_firestore::FirestoreError;
use reel_media::MediaError;
use reel_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Managed encoding failed: {0}")]
    Managed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),
}

impl WorkerError {
    pub fn probe(err: MediaError) -> Self {
        Self::Probe(err.to_string())
    }

    pub fn extraction(err: MediaError) -> Self {
        Self::Extraction(err.to_string())
    }

    pub fn encoding(err: MediaError) -> Self {
        Self::Encoding(err.to_string())
    }

    pub fn upload(err: StorageError) -> Self {
        Self::Upload(err.to_string())
    }

    pub fn store_write(err: FirestoreError) -> Self {
        Self::StoreWrite(err.to_string())
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn managed(msg: impl Into<String>) -> Self {
        Self::Managed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Probe(_) => "probe",
            WorkerError::Extraction(_) => "extraction",
            WorkerError::Encoding(_) => "encoding",
            WorkerError::Upload(_) => "upload",
            WorkerError::StoreWrite(_) => "store_write",
            WorkerError::Workspace(_) => "workspace",
            WorkerError::Managed(_) => "managed",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Queue(_) => "queue",
        }
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        Self::Workspace(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(WorkerError::probe(MediaError::NoStreams).kind(), "probe");
        assert_eq!(
            WorkerError::upload(StorageError::upload_failed("503")).kind(),
            "upload"
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(WorkerError::from(io).kind(), "workspace");
    }

    #[test]
    fn test_messages_carry_cause() {
        let err = WorkerError::probe(MediaError::NoStreams);
        assert!(err.to_string().contains("no audio or video"));
    }
}
