//! Artifact publishing.
//!
//! A publish is upload, then record write, then ledger entry, then status
//! bump. Each write is keyed so that repeating it after a crash converges on
//! the same stored state. Nothing here undoes a sibling artifact's publish.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use reel_firestore::{AppendOutcome, MediaStore, Publication};
use reel_models::{Artifact, AssetType, JobId, MediaAsset, MediaId, MediaStatus};
use reel_storage::BlobStore;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Uploads artifacts and records them against their media.
#[derive(Clone)]
pub struct ArtifactPublisher {
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn MediaStore>,
}

impl ArtifactPublisher {
    pub fn new(blobs: Arc<dyn BlobStore>, store: Arc<dyn MediaStore>) -> Self {
        Self { blobs, store }
    }

    /// Whether an earlier delivery of this job already published `destination_key`.
    pub async fn is_published(&self, job_id: &JobId, destination_key: &str) -> WorkerResult<bool> {
        let found = self
            .store
            .find_publication(job_id, destination_key)
            .await
            .map_err(WorkerError::store_write)?;
        Ok(found.is_some())
    }

    /// Publish one artifact and return its public URL.
    ///
    /// Track roles append an asset record; rendition roles overwrite their
    /// metadata field.
    pub async fn publish(&self, job_id: &JobId, media_id: &MediaId, artifact: &Artifact) -> WorkerResult<String> {
        let key = artifact.destination_key.as_str();
        let started = Instant::now();

        self.blobs
            .put_file(&artifact.local_path, key, artifact.content_type())
            .await
            .map_err(WorkerError::upload)?;
        metrics::record_stage_duration("upload", started.elapsed());

        let url = self.blobs.public_url(key);

        match artifact.role.metadata_field() {
            Some(field) => {
                self.store
                    .update_metadata_field(media_id, field, &url)
                    .await
                    .map_err(WorkerError::store_write)?;
            }
            None => {
                let asset = MediaAsset {
                    asset_type: AssetType::from(artifact.content_kind),
                    url: url.clone(),
                    media_id: media_id.clone(),
                    destination_key: key.to_string(),
                    role: artifact.role,
                    job_id: job_id.clone(),
                    created_at: Utc::now(),
                };
                let outcome = self
                    .store
                    .append_asset(&asset)
                    .await
                    .map_err(WorkerError::store_write)?;
                if outcome == AppendOutcome::AlreadyExists {
                    debug!(key, "Asset record already present");
                }
            }
        }

        let publication = Publication::new(job_id.clone(), media_id.clone(), key, url.clone(), artifact.role);
        self.store
            .record_publication(&publication)
            .await
            .map_err(WorkerError::store_write)?;

        let published = self
            .store
            .record_artifact_published(media_id)
            .await
            .map_err(WorkerError::store_write)?;
        metrics::record_artifact_published(artifact.role.as_str());

        if let Err(e) = tokio::fs::remove_file(&artifact.local_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %artifact.local_path.display(), "Failed to remove published artifact: {}", e);
            }
        }

        info!(key, role = %artifact.role, published, "Published artifact");
        Ok(url)
    }

    /// Mark the media as processing at the start of a delivery.
    ///
    /// A record that already counts published artifacts from an earlier
    /// attempt keeps its `partially_published` status.
    pub async fn begin_processing(&self, media_id: &MediaId) -> WorkerResult<()> {
        let record = self
            .store
            .get_media(media_id)
            .await
            .map_err(WorkerError::store_write)?;
        if record.is_some_and(|r| r.published_artifacts > 0) {
            debug!(media_id = %media_id, "Keeping partially published status");
            return Ok(());
        }
        self.store
            .set_status(media_id, MediaStatus::Processing)
            .await
            .map_err(WorkerError::store_write)
    }

    /// Mark the media complete. Only call once every artifact is published.
    pub async fn finalize(&self, media_id: &MediaId) -> WorkerResult<()> {
        self.store.finalize(media_id).await.map_err(WorkerError::store_write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_firestore::MemoryMediaStore;
    use reel_models::{ArtifactRole, MetadataField, RenditionKind};
    use reel_storage::MemoryBlobStore;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        work_dir: std::path::PathBuf,
        blobs: MemoryBlobStore,
        store: MemoryMediaStore,
        publisher: ArtifactPublisher,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let work_dir = dir.path().to_path_buf();
        let blobs = MemoryBlobStore::new("https://cdn.example.com");
        let store = MemoryMediaStore::new();
        store.mark_pending(&MediaId::from("m1")).await.unwrap();
        let publisher = ArtifactPublisher::new(Arc::new(blobs.clone()), Arc::new(store.clone()));
        Fixture {
            _dir: dir,
            work_dir,
            blobs,
            store,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_track_publish_appends_asset() {
        let f = fixture().await;
        let media = MediaId::from("m1");
        let job = JobId::from("j1");
        let artifact = Artifact::extracted_audio(&f.work_dir, &media, 0);
        std::fs::write(&artifact.local_path, b"audio").unwrap();

        let url = f.publisher.publish(&job, &media, &artifact).await.unwrap();
        assert_eq!(url, "https://cdn.example.com/m1/tracks/audio_0.mka");

        let stored = f.blobs.get("m1/tracks/audio_0.mka").await.unwrap();
        assert_eq!(stored.data, b"audio");
        assert_eq!(stored.content_type, "audio/x-matroska");

        let assets = f.store.assets_for(&media).await;
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].asset_type, AssetType::Audio);
        assert_eq!(assets[0].url, url);

        assert!(f.publisher.is_published(&job, "m1/tracks/audio_0.mka").await.unwrap());
        assert!(!artifact.local_path.exists());

        let record = f.store.get_media(&media).await.unwrap().unwrap();
        assert_eq!(record.status, MediaStatus::PartiallyPublished);
        assert_eq!(record.published_artifacts, 1);
    }

    #[tokio::test]
    async fn test_rendition_publish_updates_metadata() {
        let f = fixture().await;
        let media = MediaId::from("m1");
        let artifact = Artifact::rendition(&f.work_dir, &media, RenditionKind::Preview);
        std::fs::write(&artifact.local_path, b"preview").unwrap();
        assert_eq!(artifact.role, ArtifactRole::PreviewRendition);

        let url = f.publisher.publish(&JobId::from("j1"), &media, &artifact).await.unwrap();

        let metadata = f.store.get_metadata(&media).await.unwrap().unwrap();
        assert_eq!(metadata.get(MetadataField::PreviewUrl), Some(url.as_str()));
        assert_eq!(metadata.get(MetadataField::FullUrl), None);
        assert!(f.store.assets_for(&media).await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_writes_nothing() {
        let f = fixture().await;
        let media = MediaId::from("m1");
        let artifact = Artifact::combined_video(&f.work_dir, &media, 0);
        std::fs::write(&artifact.local_path, b"video").unwrap();
        f.blobs.fail_uploads("m1/tracks/video_0.mkv", 1).await;

        let err = f.publisher.publish(&JobId::from("j1"), &media, &artifact).await.unwrap_err();
        assert!(matches!(err, WorkerError::Upload(_)));
        assert!(f.store.assets_for(&media).await.is_empty());
        assert!(artifact.local_path.exists());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_store_write() {
        let f = fixture().await;
        let media = MediaId::from("m1");
        let artifact = Artifact::combined_video(&f.work_dir, &media, 0);
        std::fs::write(&artifact.local_path, b"video").unwrap();
        f.store.fail_writes(1).await;

        let err = f.publisher.publish(&JobId::from("j1"), &media, &artifact).await.unwrap_err();
        assert!(matches!(err, WorkerError::StoreWrite(_)));
        // The upload itself went through and stays.
        assert!(f.blobs.get("m1/tracks/video_0.mkv").await.is_some());
    }

    #[tokio::test]
    async fn test_begin_processing_keeps_partial_progress() {
        let f = fixture().await;
        let media = MediaId::from("m1");
        f.publisher.begin_processing(&media).await.unwrap();
        let record = f.store.get_media(&media).await.unwrap().unwrap();
        assert_eq!(record.status, MediaStatus::Processing);

        let artifact = Artifact::extracted_audio(&f.work_dir, &media, 0);
        std::fs::write(&artifact.local_path, b"audio").unwrap();
        f.publisher.publish(&JobId::from("j1"), &media, &artifact).await.unwrap();

        // A retried delivery starts over without hiding what is already out
        f.publisher.begin_processing(&media).await.unwrap();
        let record = f.store.get_media(&media).await.unwrap().unwrap();
        assert_eq!(record.status, MediaStatus::PartiallyPublished);
        assert_eq!(record.published_artifacts, 1);
    }

    #[tokio::test]
    async fn test_republish_overwrites_object_and_keeps_one_asset() {
        let f = fixture().await;
        let media = MediaId::from("m1");
        let artifact = Artifact::extracted_audio(&f.work_dir, &media, 1);

        std::fs::write(&artifact.local_path, b"first").unwrap();
        let first = f.publisher.publish(&JobId::from("j1"), &media, &artifact).await.unwrap();
        std::fs::write(&artifact.local_path, b"second").unwrap();
        let second = f.publisher.publish(&JobId::from("j2"), &media, &artifact).await.unwrap();

        assert_eq!(first, second);
        let stored = f.blobs.get("m1/tracks/audio_1.mka").await.unwrap();
        assert_eq!(stored.data, b"second");
        assert_eq!(stored.writes, 2);
        assert_eq!(f.store.assets_for(&media).await.len(), 1);
    }
}
