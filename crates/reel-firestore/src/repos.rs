//! Typed repositories for media, assets, metadata and publications.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use reel_models::{
    ArtifactRole, AssetType, JobId, MediaAsset, MediaId, MediaMetadata, MediaRecord, MediaStatus,
    MetadataField,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{AppendOutcome, Publication};
use crate::types::{Document, ToFirestoreValue, Value};

/// Collection holding one document per media entity.
pub const MEDIA_COLLECTION: &str = "media";
/// Collection holding one document per extracted/combined track.
pub const ASSETS_COLLECTION: &str = "media_assets";
/// Collection holding rendition references per media entity.
pub const METADATA_COLLECTION: &str = "metadata";
/// Idempotency ledger of completed publishes.
pub const PUBLICATIONS_COLLECTION: &str = "publications";

fn masked(fields: &HashMap<String, Value>) -> Option<Vec<String>> {
    let mut mask: Vec<String> = fields.keys().cloned().collect();
    mask.sort();
    Some(mask)
}

/// Repository for media documents.
#[derive(Clone)]
pub struct MediaRepository {
    client: FirestoreClient,
}

impl MediaRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaRecord>> {
        let doc = self.client.get_document(MEDIA_COLLECTION, media_id.as_str()).await?;
        doc.map(|d| document_to_media_record(&d, media_id)).transpose()
    }

    async fn write(&self, media_id: &MediaId, mut fields: HashMap<String, Value>) -> FirestoreResult<()> {
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        let mask = masked(&fields);
        self.client
            .update_document(MEDIA_COLLECTION, media_id.as_str(), fields, mask)
            .await?;
        Ok(())
    }

    /// Reset the record for a fresh upload.
    pub async fn mark_pending(&self, media_id: &MediaId) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("isProcessing".to_string(), true.to_firestore_value());
        fields.insert("status".to_string(), MediaStatus::Pending.as_str().to_firestore_value());
        fields.insert("published_artifacts".to_string(), 0u32.to_firestore_value());
        fields.insert("last_error".to_string(), Option::<String>::None.to_firestore_value());
        self.write(media_id, fields).await
    }

    pub async fn update_status(&self, media_id: &MediaId, status: MediaStatus) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        self.write(media_id, fields).await
    }

    /// Bump the published count and mark the record partially published.
    ///
    /// Read-modify-write: one job owns a media record at a time.
    pub async fn increment_published(&self, media_id: &MediaId) -> FirestoreResult<u32> {
        let current = self
            .client
            .get_document(MEDIA_COLLECTION, media_id.as_str())
            .await?
            .and_then(|d| d.get::<u32>("published_artifacts"))
            .unwrap_or(0);
        let next = current + 1;

        let mut fields = HashMap::new();
        fields.insert("published_artifacts".to_string(), next.to_firestore_value());
        fields.insert(
            "status".to_string(),
            MediaStatus::PartiallyPublished.as_str().to_firestore_value(),
        );
        self.write(media_id, fields).await?;
        Ok(next)
    }

    /// Flip `isProcessing` off and mark the record completed.
    pub async fn complete(&self, media_id: &MediaId) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("isProcessing".to_string(), false.to_firestore_value());
        fields.insert("status".to_string(), MediaStatus::Completed.as_str().to_firestore_value());
        fields.insert("last_error".to_string(), Option::<String>::None.to_firestore_value());
        self.write(media_id, fields).await?;
        info!(media_id = %media_id, "Media processing complete");
        Ok(())
    }

    /// Record a terminal failure. `isProcessing` is left as is.
    pub async fn fail(&self, media_id: &MediaId, error: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), MediaStatus::Failed.as_str().to_firestore_value());
        fields.insert("last_error".to_string(), error.to_firestore_value());
        self.write(media_id, fields).await
    }
}

/// Repository for track asset documents.
#[derive(Clone)]
pub struct AssetRepository {
    client: FirestoreClient,
}

impl AssetRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create the asset unless a document for its destination key exists.
    pub async fn create_if_absent(&self, asset: &MediaAsset) -> FirestoreResult<AppendOutcome> {
        let doc_id = MediaAsset::document_id(&asset.destination_key);

        if self.client.get_document(ASSETS_COLLECTION, &doc_id).await?.is_some() {
            debug!(key = %asset.destination_key, "Asset record already present");
            return Ok(AppendOutcome::AlreadyExists);
        }

        match self
            .client
            .create_document(ASSETS_COLLECTION, &doc_id, asset_to_fields(asset))
            .await
        {
            Ok(_) => Ok(AppendOutcome::Created),
            // Lost a race with another delivery of the same job
            Err(FirestoreError::AlreadyExists(_)) => Ok(AppendOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

/// Repository for rendition metadata documents.
#[derive(Clone)]
pub struct MetadataRepository {
    client: FirestoreClient,
}

impl MetadataRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, media_id: &MediaId) -> FirestoreResult<Option<MediaMetadata>> {
        let doc = self
            .client
            .get_document(METADATA_COLLECTION, media_id.as_str())
            .await?;
        Ok(doc.map(|d| MediaMetadata {
            preview_url: d.get(MetadataField::PreviewUrl.as_str()),
            full_url: d.get(MetadataField::FullUrl.as_str()),
        }))
    }

    /// Overwrite one reference field, creating the document if needed.
    pub async fn set_field(&self, media_id: &MediaId, field: MetadataField, url: &str) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert(field.as_str().to_string(), url.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        let mask = masked(&fields);

        self.client
            .update_document(METADATA_COLLECTION, media_id.as_str(), fields, mask)
            .await?;
        Ok(())
    }
}

/// Repository for the publication ledger.
#[derive(Clone)]
pub struct PublicationRepository {
    client: FirestoreClient,
}

impl PublicationRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn document_id(job_id: &JobId, destination_key: &str) -> String {
        format!("{}__{}", job_id, MediaAsset::document_id(destination_key))
    }

    pub async fn get(&self, job_id: &JobId, destination_key: &str) -> FirestoreResult<Option<Publication>> {
        let doc = self
            .client
            .get_document(PUBLICATIONS_COLLECTION, &Self::document_id(job_id, destination_key))
            .await?;
        doc.map(|d| document_to_publication(&d)).transpose()
    }

    pub async fn record(&self, publication: &Publication) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("job_id".to_string(), publication.job_id.as_str().to_firestore_value());
        fields.insert("media_id".to_string(), publication.media_id.as_str().to_firestore_value());
        fields.insert(
            "destination_key".to_string(),
            publication.destination_key.to_firestore_value(),
        );
        fields.insert("url".to_string(), publication.url.to_firestore_value());
        fields.insert("role".to_string(), publication.role.as_str().to_firestore_value());
        fields.insert("published_at".to_string(), publication.published_at.to_firestore_value());

        // Full overwrite: a ledger entry is immutable apart from re-recording
        self.client
            .update_document(
                PUBLICATIONS_COLLECTION,
                &Self::document_id(&publication.job_id, &publication.destination_key),
                fields,
                None,
            )
            .await?;
        Ok(())
    }
}

fn asset_to_fields(asset: &MediaAsset) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("type".to_string(), asset.asset_type.as_str().to_firestore_value());
    fields.insert("url".to_string(), asset.url.to_firestore_value());
    fields.insert("mediaId".to_string(), asset.media_id.as_str().to_firestore_value());
    fields.insert("destination_key".to_string(), asset.destination_key.to_firestore_value());
    fields.insert("role".to_string(), asset.role.as_str().to_firestore_value());
    fields.insert("job_id".to_string(), asset.job_id.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), asset.created_at.to_firestore_value());
    fields
}

/// Parse an asset document. Used by the integration tests.
pub fn document_to_asset(doc: &Document) -> FirestoreResult<MediaAsset> {
    let missing = |field: &str| FirestoreError::invalid_response(format!("asset missing {}", field));

    Ok(MediaAsset {
        asset_type: doc
            .get::<String>("type")
            .and_then(|t| AssetType::parse(&t))
            .ok_or_else(|| missing("type"))?,
        url: doc.get("url").ok_or_else(|| missing("url"))?,
        media_id: MediaId::from_string(doc.get::<String>("mediaId").ok_or_else(|| missing("mediaId"))?),
        destination_key: doc.get("destination_key").ok_or_else(|| missing("destination_key"))?,
        role: doc
            .get::<String>("role")
            .and_then(|r| ArtifactRole::parse(&r))
            .ok_or_else(|| missing("role"))?,
        job_id: JobId::from_string(doc.get::<String>("job_id").ok_or_else(|| missing("job_id"))?),
        created_at: doc.get("created_at").unwrap_or_else(Utc::now),
    })
}

fn document_to_media_record(doc: &Document, media_id: &MediaId) -> FirestoreResult<MediaRecord> {
    let status = doc
        .get::<String>("status")
        .map(|s| {
            MediaStatus::parse(&s)
                .ok_or_else(|| FirestoreError::invalid_response(format!("unknown media status {}", s)))
        })
        .transpose()?
        .unwrap_or_default();

    Ok(MediaRecord {
        id: media_id.clone(),
        is_processing: doc.get("isProcessing").unwrap_or(true),
        status,
        published_artifacts: doc.get("published_artifacts").unwrap_or(0),
        last_error: doc.get("last_error"),
        updated_at: doc.get("updated_at").unwrap_or_else(Utc::now),
    })
}

fn document_to_publication(doc: &Document) -> FirestoreResult<Publication> {
    let missing = |field: &str| FirestoreError::invalid_response(format!("publication missing {}", field));

    Ok(Publication {
        job_id: JobId::from_string(doc.get::<String>("job_id").ok_or_else(|| missing("job_id"))?),
        media_id: MediaId::from_string(doc.get::<String>("media_id").ok_or_else(|| missing("media_id"))?),
        destination_key: doc.get("destination_key").ok_or_else(|| missing("destination_key"))?,
        url: doc.get("url").ok_or_else(|| missing("url"))?,
        role: doc
            .get::<String>("role")
            .and_then(|r| ArtifactRole::parse(&r))
            .ok_or_else(|| missing("role"))?,
        published_at: doc.get("published_at").unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_fields_round_trip() {
        let asset = MediaAsset {
            asset_type: AssetType::Audio,
            url: "https://cdn/m1/tracks/audio_0.mka".to_string(),
            media_id: MediaId::from("m1"),
            destination_key: "m1/tracks/audio_0.mka".to_string(),
            role: ArtifactRole::ExtractedTrack,
            job_id: JobId::from("j1"),
            created_at: Utc::now(),
        };

        let doc = Document::new(asset_to_fields(&asset));
        let parsed = document_to_asset(&doc).unwrap();
        assert_eq!(parsed.asset_type, AssetType::Audio);
        assert_eq!(parsed.destination_key, asset.destination_key);
        assert_eq!(parsed.role, ArtifactRole::ExtractedTrack);
    }

    #[test]
    fn test_media_record_defaults() {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), "completed".to_firestore_value());
        fields.insert("isProcessing".to_string(), false.to_firestore_value());
        let record = document_to_media_record(&Document::new(fields), &MediaId::from("m1")).unwrap();
        assert_eq!(record.status, MediaStatus::Completed);
        assert!(!record.is_processing);
        assert_eq!(record.published_artifacts, 0);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), "exploded".to_firestore_value());
        assert!(document_to_media_record(&Document::new(fields), &MediaId::from("m1")).is_err());
    }

    #[test]
    fn test_publication_doc_id() {
        assert_eq!(
            PublicationRepository::document_id(&JobId::from("j1"), "m1/renditions/full.mp4"),
            "j1__m1__renditions__full.mp4"
        );
    }
}
