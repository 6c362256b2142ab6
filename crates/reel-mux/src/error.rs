//! Mux client error types.

use thiserror::Error;

pub type MuxResult<T> = Result<T, MuxError>;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Mux service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MuxError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MuxError::ServiceUnavailable(_) | MuxError::Network(_))
    }
}
