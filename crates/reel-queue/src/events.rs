//! Job events via Redis Pub/Sub.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::debug;

use reel_models::{JobEvent, JobId};

use crate::error::QueueResult;

/// Fan-in channel carrying events for every job.
pub const EVENTS_CHANNEL: &str = "reel:events";

/// Receiver of job lifecycle events. Observability only.
#[async_trait]
pub trait JobEventSink: Send + Sync {
    async fn publish(&self, event: &JobEvent) -> QueueResult<()>;
}

/// Channel for publishing/subscribing to job events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Per-job channel name.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("{}:{}", EVENTS_CHANNEL, job_id)
    }

    /// Subscribe to the events of one job.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
        self.subscribe_channel(Self::channel_name(job_id)).await
    }

    async fn subscribe_channel(
        &self,
        channel: String,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl JobEventSink for ProgressChannel {
    async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(event.job_id());
        let payload = serde_json::to_string(event)?;

        debug!(job_id = %event.job_id(), kind = event.kind().as_str(), "Publishing job event");
        conn.publish::<_, _, ()>(&channel, &payload).await?;
        conn.publish::<_, _, ()>(EVENTS_CHANNEL, &payload).await?;

        Ok(())
    }
}

/// Sink that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<RwLock<Vec<JobEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<JobEvent> {
        self.events.read().await.clone()
    }

    pub async fn events_for(&self, job_id: &JobId) -> Vec<JobEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.job_id() == job_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobEventSink for MemoryEventSink {
    async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
