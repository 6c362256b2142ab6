//! Firestore integration tests.
//!
//! Run against the emulator with `FIRESTORE_EMULATOR_HOST` and
//! `GCP_PROJECT_ID` set.

use chrono::Utc;
use reel_firestore::{AppendOutcome, FirestoreMediaStore, MediaStore, Publication};
use reel_models::{ArtifactRole, AssetType, JobId, MediaAsset, MediaId, MediaStatus, MetadataField};

async fn store() -> FirestoreMediaStore {
    dotenvy::dotenv().ok();
    FirestoreMediaStore::from_env()
        .await
        .expect("Failed to create Firestore store")
}

#[tokio::test]
#[ignore = "requires Firestore emulator"]
async fn test_media_lifecycle() {
    let store = store().await;
    let id = MediaId::from_string(format!("it-{}", JobId::new()));

    store.mark_pending(&id).await.unwrap();
    store.set_status(&id, MediaStatus::Processing).await.unwrap();
    assert_eq!(store.record_artifact_published(&id).await.unwrap(), 1);
    store.finalize(&id).await.unwrap();

    let record = store.get_media(&id).await.unwrap().expect("media record");
    assert!(!record.is_processing);
    assert_eq!(record.status, MediaStatus::Completed);
    assert_eq!(record.published_artifacts, 1);
}

#[tokio::test]
#[ignore = "requires Firestore emulator"]
async fn test_asset_append_and_ledger() {
    let store = store().await;
    let job_id = JobId::new();
    let id = MediaId::from_string(format!("it-{}", job_id));
    let key = format!("{}/tracks/audio_0.mka", id);

    let asset = MediaAsset {
        asset_type: AssetType::Audio,
        url: format!("https://cdn.example/{}", key),
        media_id: id.clone(),
        destination_key: key.clone(),
        role: ArtifactRole::ExtractedTrack,
        job_id: job_id.clone(),
        created_at: Utc::now(),
    };
    assert_eq!(store.append_asset(&asset).await.unwrap(), AppendOutcome::Created);
    assert_eq!(store.append_asset(&asset).await.unwrap(), AppendOutcome::AlreadyExists);

    let publication = Publication::new(
        job_id.clone(),
        id.clone(),
        key.clone(),
        asset.url.clone(),
        ArtifactRole::ExtractedTrack,
    );
    store.record_publication(&publication).await.unwrap();
    let found = store.find_publication(&job_id, &key).await.unwrap().expect("ledger entry");
    assert_eq!(found.url, asset.url);

    store
        .update_metadata_field(&id, MetadataField::PreviewUrl, "https://cdn.example/p.mp4")
        .await
        .unwrap();
    let meta = store.get_metadata(&id).await.unwrap().expect("metadata");
    assert_eq!(meta.preview_url.as_deref(), Some("https://cdn.example/p.mp4"));
    assert!(meta.full_url.is_none());
}
