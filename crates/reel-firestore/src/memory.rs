//! In-memory media store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use reel_models::{JobId, MediaAsset, MediaId, MediaMetadata, MediaRecord, MediaStatus, MetadataField};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{AppendOutcome, MediaStore, Publication};

#[derive(Debug, Default)]
struct State {
    media: HashMap<MediaId, MediaRecord>,
    assets: HashMap<String, MediaAsset>,
    metadata: HashMap<MediaId, MediaMetadata>,
    publications: HashMap<(JobId, String), Publication>,
    /// `isProcessing` true -> false transitions per media id
    completions: HashMap<MediaId, u32>,
    failing_writes: u32,
}

/// `MediaStore` held in process memory, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryMediaStore {
    state: Arc<RwLock<State>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` write operations fail with a server error.
    pub async fn fail_writes(&self, times: u32) {
        self.state.write().await.failing_writes = times;
    }

    /// Assets for one media entity, ordered by destination key.
    pub async fn assets_for(&self, media_id: &MediaId) -> Vec<MediaAsset> {
        let state = self.state.read().await;
        let mut assets: Vec<MediaAsset> = state
            .assets
            .values()
            .filter(|a| &a.media_id == media_id)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.destination_key.cmp(&b.destination_key));
        assets
    }

    pub async fn publications_for(&self, job_id: &JobId) -> Vec<Publication> {
        let state = self.state.read().await;
        state
            .publications
            .values()
            .filter(|p| &p.job_id == job_id)
            .cloned()
            .collect()
    }

    /// How many times `isProcessing` went from true to false.
    pub async fn completion_count(&self, media_id: &MediaId) -> u32 {
        self.state
            .read()
            .await
            .completions
            .get(media_id)
            .copied()
            .unwrap_or(0)
    }

    async fn write_state(&self) -> FirestoreResult<tokio::sync::RwLockWriteGuard<'_, State>> {
        let mut state = self.state.write().await;
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(FirestoreError::ServerError(503, "injected write failure".to_string()));
        }
        Ok(state)
    }
}

fn record_mut<'a>(state: &'a mut State, media_id: &MediaId) -> &'a mut MediaRecord {
    state
        .media
        .entry(media_id.clone())
        .or_insert_with(|| MediaRecord::new(media_id.clone()))
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn mark_pending(&self, media_id: &MediaId) -> FirestoreResult<()> {
        let mut state = self.write_state().await?;
        state.media.insert(media_id.clone(), MediaRecord::new(media_id.clone()));
        Ok(())
    }

    async fn set_status(&self, media_id: &MediaId, status: MediaStatus) -> FirestoreResult<()> {
        let mut state = self.write_state().await?;
        let record = record_mut(&mut state, media_id);
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn append_asset(&self, asset: &MediaAsset) -> FirestoreResult<AppendOutcome> {
        let mut state = self.write_state().await?;
        if state.assets.contains_key(&asset.destination_key) {
            return Ok(AppendOutcome::AlreadyExists);
        }
        state
            .assets
            .insert(asset.destination_key.clone(), asset.clone());
        Ok(AppendOutcome::Created)
    }

    async fn update_metadata_field(
        &self,
        media_id: &MediaId,
        field: MetadataField,
        url: &str,
    ) -> FirestoreResult<()> {
        let mut state = self.write_state().await?;
        state
            .metadata
            .entry(media_id.clone())
            .or_default()
            .set(field, url);
        Ok(())
    }

    async fn find_publication(
        &self,
        job_id: &JobId,
        destination_key: &str,
    ) -> FirestoreResult<Option<Publication>> {
        let state = self.state.read().await;
        Ok(state
            .publications
            .get(&(job_id.clone(), destination_key.to_string()))
            .cloned())
    }

    async fn record_publication(&self, publication: &Publication) -> FirestoreResult<()> {
        let mut state = self.write_state().await?;
        state.publications.insert(
            (publication.job_id.clone(), publication.destination_key.clone()),
            publication.clone(),
        );
        Ok(())
    }

    async fn record_artifact_published(&self, media_id: &MediaId) -> FirestoreResult<u32> {
        let mut state = self.write_state().await?;
        let record = record_mut(&mut state, media_id);
        record.published_artifacts += 1;
        record.status = MediaStatus::PartiallyPublished;
        record.updated_at = Utc::now();
        Ok(record.published_artifacts)
    }

    async fn finalize(&self, media_id: &MediaId) -> FirestoreResult<()> {
        let mut state = self.write_state().await?;
        let record = record_mut(&mut state, media_id);
        let was_processing = record.is_processing;
        record.is_processing = false;
        record.status = MediaStatus::Completed;
        record.last_error = None;
        record.updated_at = Utc::now();

        if was_processing {
            *state.completions.entry(media_id.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn mark_failed(&self, media_id: &MediaId, error: &str) -> FirestoreResult<()> {
        let mut state = self.write_state().await?;
        let record = record_mut(&mut state, media_id);
        record.status = MediaStatus::Failed;
        record.last_error = Some(error.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get_media(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaRecord>> {
        Ok(self.state.read().await.media.get(media_id).cloned())
    }

    async fn get_metadata(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaMetadata>> {
        Ok(self.state.read().await.metadata.get(media_id).cloned())
    }
}
