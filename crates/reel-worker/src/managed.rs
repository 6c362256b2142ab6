//! Managed encoding: hand the upload to Mux and wait for a playable asset.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use reel_firestore::MediaStore;
use reel_models::{MediaStatus, MetadataField};
use reel_mux::{wait_until_ready, Asset, AssetStatus, MuxClient, PollError, PollStatus, UploadStatus};
use reel_queue::{JobEventSink, QueuedJob};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::processor::{JobProcessor, ProgressReporter};

/// Pipeline that delegates encoding to Mux.
pub struct ManagedPipeline {
    mux: Arc<MuxClient>,
    store: Arc<dyn MediaStore>,
    progress: ProgressReporter,
}

impl ManagedPipeline {
    pub fn new(mux: Arc<MuxClient>, store: Arc<dyn MediaStore>, events: Arc<dyn JobEventSink>) -> Self {
        Self {
            mux,
            store,
            progress: ProgressReporter::new(events),
        }
    }

    /// Wait for the direct upload to turn into an asset id.
    async fn wait_for_asset_id(&self, upload_id: &str) -> WorkerResult<String> {
        let config = self.mux.config();
        wait_until_ready(config.poll_interval, config.poll_budget, || {
            let mux = Arc::clone(&self.mux);
            let upload_id = upload_id.to_string();
            async move {
                let upload = mux.get_upload(&upload_id).await?;
                Ok(match (upload.status, upload.asset_id) {
                    (UploadStatus::AssetCreated, Some(asset_id)) => PollStatus::Ready(asset_id),
                    (UploadStatus::Errored | UploadStatus::Cancelled | UploadStatus::TimedOut, _) => {
                        PollStatus::Failed(format!("upload {} ended without an asset", upload_id))
                    }
                    _ => PollStatus::Pending,
                })
            }
        })
        .await
        .map_err(poll_error)
    }

    /// Wait for the asset to finish encoding.
    async fn wait_for_ready_asset(&self, asset_id: &str) -> WorkerResult<Asset> {
        let config = self.mux.config();
        wait_until_ready(config.poll_interval, config.poll_budget, || {
            let mux = Arc::clone(&self.mux);
            let asset_id = asset_id.to_string();
            async move {
                let asset = mux.get_asset(&asset_id).await?;
                Ok(match asset.status {
                    AssetStatus::Ready => PollStatus::Ready(asset),
                    AssetStatus::Errored => PollStatus::Failed(format!("asset {} errored", asset_id)),
                    _ => PollStatus::Pending,
                })
            }
        })
        .await
        .map_err(poll_error)
    }
}

fn poll_error(err: PollError) -> WorkerError {
    WorkerError::managed(err.to_string())
}

#[async_trait]
impl JobProcessor for ManagedPipeline {
    fn operation(&self) -> &'static str {
        "managed"
    }

    async fn process(&self, job: &QueuedJob) -> WorkerResult<()> {
        let payload = &job.payload;
        let media_id = &payload.video_id;
        let logger = JobLogger::new(&job.id, media_id, self.operation());
        logger.log_start(&format!("attempt {}/{}", job.attempt(), job.options.attempts));

        self.store
            .set_status(media_id, MediaStatus::Processing)
            .await
            .map_err(WorkerError::store_write)?;

        let upload = self
            .mux
            .create_direct_upload()
            .await
            .map_err(|e| WorkerError::managed(e.to_string()))?;
        let upload_url = upload
            .url
            .as_deref()
            .ok_or_else(|| WorkerError::managed("direct upload has no url"))?;

        self.mux
            .upload_bytes(upload_url, payload.file.clone(), &payload.mimetype)
            .await
            .map_err(|e| WorkerError::managed(e.to_string()))?;
        self.progress.report(job, 30, "uploaded").await;

        let asset_id = self.wait_for_asset_id(&upload.id).await?;
        debug!(asset_id = %asset_id, "Mux asset created");
        self.progress.report(job, 50, "encoding").await;

        let asset = self.wait_for_ready_asset(&asset_id).await?;
        let stream_url = asset
            .stream_url()
            .ok_or_else(|| WorkerError::managed(format!("asset {} has no playback id", asset.id)))?;

        self.store
            .update_metadata_field(media_id, MetadataField::FullUrl, &stream_url)
            .await
            .map_err(WorkerError::store_write)?;
        self.store
            .record_artifact_published(media_id)
            .await
            .map_err(WorkerError::store_write)?;
        self.store.finalize(media_id).await.map_err(WorkerError::store_write)?;

        self.progress.report(job, 100, "published").await;
        logger.log_completion(&format!("stream ready at {}", stream_url));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_firestore::MemoryMediaStore;
    use reel_models::MediaId;
    use reel_mux::MuxConfig;
    use reel_queue::{JobOptions, MemoryEventSink, TranscodeJob};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mux_for(server: &MockServer, budget: Duration) -> Arc<MuxClient> {
        let mut config = MuxConfig::new("token", "secret");
        config.base_url = server.uri();
        config.poll_interval = Duration::from_millis(10);
        config.poll_budget = budget;
        Arc::new(MuxClient::new(config).unwrap())
    }

    fn job() -> QueuedJob {
        QueuedJob::new(
            TranscodeJob::new(b"video".to_vec(), "video/mp4", MediaId::from("m1")),
            JobOptions::default(),
        )
    }

    async fn mount_upload(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/video/v1/uploads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": {"id": "up1", "url": format!("{}/put/up1", server.uri()), "status": "waiting"}
            })))
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/put/up1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video/v1/uploads/up1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "up1", "status": "asset_created", "asset_id": "a1"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_ready_asset_sets_full_url() {
        let server = MockServer::start().await;
        mount_upload(&server).await;
        Mock::given(method("GET"))
            .and(path("/video/v1/assets/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "a1", "status": "ready", "playback_ids": [{"id": "pb1", "policy": "public"}]}
            })))
            .mount(&server)
            .await;

        let store = MemoryMediaStore::new();
        let media = MediaId::from("m1");
        store.mark_pending(&media).await.unwrap();
        let pipeline = ManagedPipeline::new(
            mux_for(&server, Duration::from_secs(1)),
            Arc::new(store.clone()),
            Arc::new(MemoryEventSink::new()),
        );

        pipeline.process(&job()).await.unwrap();

        let metadata = store.get_metadata(&media).await.unwrap().unwrap();
        assert_eq!(
            metadata.get(MetadataField::FullUrl),
            Some("https://stream.mux.com/pb1.m3u8")
        );
        let record = store.get_media(&media).await.unwrap().unwrap();
        assert!(!record.is_processing);
        assert_eq!(record.status, MediaStatus::Completed);
    }

    #[tokio::test]
    async fn test_asset_never_ready_times_out() {
        let server = MockServer::start().await;
        mount_upload(&server).await;
        Mock::given(method("GET"))
            .and(path("/video/v1/assets/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "a1", "status": "preparing"}
            })))
            .mount(&server)
            .await;

        let store = MemoryMediaStore::new();
        let media = MediaId::from("m1");
        store.mark_pending(&media).await.unwrap();
        let pipeline = ManagedPipeline::new(
            mux_for(&server, Duration::from_millis(50)),
            Arc::new(store.clone()),
            Arc::new(MemoryEventSink::new()),
        );

        let err = pipeline.process(&job()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Managed(ref msg) if msg.contains("Not ready")));
        assert!(store.get_media(&media).await.unwrap().unwrap().is_processing);
    }
}
