//! Application state.

use std::sync::Arc;

use reel_firestore::{FirestoreMediaStore, MediaStore};
use reel_queue::{JobOptions, RedisQueue, WorkQueue};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<dyn WorkQueue>,
    pub store: Arc<dyn MediaStore>,
    /// Options applied to every ingested job
    pub job_options: JobOptions,
}

impl AppState {
    /// Create application state backed by Redis and Firestore.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let queue = RedisQueue::from_env()?;
        let job_options = queue.config().default_job_options();
        let store = FirestoreMediaStore::from_env().await?;

        Ok(Self::with_backends(config, Arc::new(queue), Arc::new(store), job_options))
    }

    pub fn with_backends(
        config: ApiConfig,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn MediaStore>,
        job_options: JobOptions,
    ) -> Self {
        Self {
            config,
            queue,
            store,
            job_options,
        }
    }
}
