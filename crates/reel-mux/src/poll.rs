//! Bounded readiness polling.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::error::MuxError;

/// One readiness check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
    /// Terminal failure on the remote side
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    /// Budget spent without reaching a terminal state
    #[error("Not ready after {0:?}")]
    Timeout(Duration),

    /// Remote reached a terminal error state
    #[error("Will never be ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Mux(#[from] MuxError),
}

/// Call `check` every `interval` until it reports ready or failed, or until
/// `budget` has elapsed.
pub async fn wait_until_ready<T, F, Fut>(interval: Duration, budget: Duration, mut check: F) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, MuxError>>,
{
    let started = Instant::now();
    let mut checks = 0u32;

    loop {
        checks += 1;
        match check().await? {
            PollStatus::Ready(value) => return Ok(value),
            PollStatus::Failed(reason) => return Err(PollError::NotReady(reason)),
            PollStatus::Pending => {}
        }

        let elapsed = started.elapsed();
        if elapsed + interval > budget {
            return Err(PollError::Timeout(elapsed));
        }
        debug!(checks, elapsed_ms = elapsed.as_millis() as u64, "Not ready yet");
        tokio::time::sleep(interval).await;
    }
}
