//! The media record store the API and worker write through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_models::{ArtifactRole, JobId, MediaAsset, MediaId, MediaMetadata, MediaRecord, MediaStatus, MetadataField};

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::repos::{AssetRepository, MediaRepository, MetadataRepository, PublicationRepository};

/// Result of appending an asset record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Created,
    /// A record for the same destination key was already there
    AlreadyExists,
}

/// Ledger entry for an artifact a job has fully published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub job_id: JobId,
    pub media_id: MediaId,
    pub destination_key: String,
    pub url: String,
    pub role: ArtifactRole,
    pub published_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(
        job_id: JobId,
        media_id: MediaId,
        destination_key: impl Into<String>,
        url: impl Into<String>,
        role: ArtifactRole,
    ) -> Self {
        Self {
            job_id,
            media_id,
            destination_key: destination_key.into(),
            url: url.into(),
            role,
            published_at: Utc::now(),
        }
    }
}

/// Document store operations for media processing.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Reset a media record for a new upload: `isProcessing = true`, pending.
    async fn mark_pending(&self, media_id: &MediaId) -> FirestoreResult<()>;

    async fn set_status(&self, media_id: &MediaId, status: MediaStatus) -> FirestoreResult<()>;

    /// Append a track asset. Idempotent per destination key.
    async fn append_asset(&self, asset: &MediaAsset) -> FirestoreResult<AppendOutcome>;

    /// Set one rendition reference, leaving the other field untouched.
    async fn update_metadata_field(
        &self,
        media_id: &MediaId,
        field: MetadataField,
        url: &str,
    ) -> FirestoreResult<()>;

    async fn find_publication(
        &self,
        job_id: &JobId,
        destination_key: &str,
    ) -> FirestoreResult<Option<Publication>>;

    async fn record_publication(&self, publication: &Publication) -> FirestoreResult<()>;

    /// Count one more published artifact. Returns the new count.
    async fn record_artifact_published(&self, media_id: &MediaId) -> FirestoreResult<u32>;

    /// Mark processing finished: `isProcessing = false`, completed.
    async fn finalize(&self, media_id: &MediaId) -> FirestoreResult<()>;

    /// Mark the record failed with the last error.
    async fn mark_failed(&self, media_id: &MediaId, error: &str) -> FirestoreResult<()>;

    async fn get_media(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaRecord>>;

    async fn get_metadata(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaMetadata>>;
}

/// `MediaStore` backed by Firestore.
#[derive(Clone)]
pub struct FirestoreMediaStore {
    media: MediaRepository,
    assets: AssetRepository,
    metadata: MetadataRepository,
    publications: PublicationRepository,
}

impl FirestoreMediaStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            media: MediaRepository::new(client.clone()),
            assets: AssetRepository::new(client.clone()),
            metadata: MetadataRepository::new(client.clone()),
            publications: PublicationRepository::new(client),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env().await?))
    }
}

#[async_trait]
impl MediaStore for FirestoreMediaStore {
    async fn mark_pending(&self, media_id: &MediaId) -> FirestoreResult<()> {
        self.media.mark_pending(media_id).await
    }

    async fn set_status(&self, media_id: &MediaId, status: MediaStatus) -> FirestoreResult<()> {
        self.media.update_status(media_id, status).await
    }

    async fn append_asset(&self, asset: &MediaAsset) -> FirestoreResult<AppendOutcome> {
        self.assets.create_if_absent(asset).await
    }

    async fn update_metadata_field(
        &self,
        media_id: &MediaId,
        field: MetadataField,
        url: &str,
    ) -> FirestoreResult<()> {
        self.metadata.set_field(media_id, field, url).await
    }

    async fn find_publication(
        &self,
        job_id: &JobId,
        destination_key: &str,
    ) -> FirestoreResult<Option<Publication>> {
        self.publications.get(job_id, destination_key).await
    }

    async fn record_publication(&self, publication: &Publication) -> FirestoreResult<()> {
        self.publications.record(publication).await
    }

    async fn record_artifact_published(&self, media_id: &MediaId) -> FirestoreResult<u32> {
        self.media.increment_published(media_id).await
    }

    async fn finalize(&self, media_id: &MediaId) -> FirestoreResult<()> {
        self.media.complete(media_id).await
    }

    async fn mark_failed(&self, media_id: &MediaId, error: &str) -> FirestoreResult<()> {
        self.media.fail(media_id, error).await
    }

    async fn get_media(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaRecord>> {
        self.media.get(media_id).await
    }

    async fn get_metadata(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaMetadata>> {
        self.metadata.get(media_id).await
    }
}
