//! Persisted media records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::{ArtifactRole, ContentKind};
use crate::job::JobId;

/// Identifier of the owning media entity (the uploader's `videoId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id is usable as a path segment and document id.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MediaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MediaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Processing status of a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    /// Uploaded and queued
    #[default]
    Pending,
    /// A worker is running the pipeline
    Processing,
    /// Some artifacts are published, the pipeline has not finished
    PartiallyPublished,
    /// Every artifact is published
    Completed,
    /// The job exhausted its attempts
    Failed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "pending",
            MediaStatus::Processing => "processing",
            MediaStatus::PartiallyPublished => "partially_published",
            MediaStatus::Completed => "completed",
            MediaStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MediaStatus::Pending),
            "processing" => Some(MediaStatus::Processing),
            "partially_published" => Some(MediaStatus::PartiallyPublished),
            "completed" => Some(MediaStatus::Completed),
            "failed" => Some(MediaStatus::Failed),
            _ => None,
        }
    }

    /// `isProcessing` only flips to false once the pipeline fully succeeds.
    pub fn is_processing(&self) -> bool {
        !matches!(self, MediaStatus::Completed)
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The owning media entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaRecord {
    pub id: MediaId,
    #[serde(rename = "isProcessing")]
    pub is_processing: bool,
    pub status: MediaStatus,
    #[serde(default)]
    pub published_artifacts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn new(id: MediaId) -> Self {
        Self {
            id,
            is_processing: true,
            status: MediaStatus::Pending,
            published_artifacts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Media asset type stored on the asset record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Audio,
    Video,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Audio => "AUDIO",
            AssetType::Video => "VIDEO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUDIO" => Some(AssetType::Audio),
            "VIDEO" => Some(AssetType::Video),
            _ => None,
        }
    }
}

impl From<ContentKind> for AssetType {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Audio => AssetType::Audio,
            ContentKind::Video => AssetType::Video,
        }
    }
}

/// Public reference to one extracted or combined track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaAsset {
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub url: String,
    #[serde(rename = "mediaId")]
    pub media_id: MediaId,
    pub destination_key: String,
    pub role: ArtifactRole,
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
}

impl MediaAsset {
    /// Document id for the asset record.
    ///
    /// Derived from the destination key so a repeated append targets the same
    /// document and can be detected.
    pub fn document_id(destination_key: &str) -> String {
        destination_key.replace('/', "__")
    }
}

/// Named reference fields on the metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    PreviewUrl,
    FullUrl,
}

impl MetadataField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::PreviewUrl => "preview_url",
            MetadataField::FullUrl => "full_url",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rendition references for one media entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
}

impl MediaMetadata {
    pub fn get(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::PreviewUrl => self.preview_url.as_deref(),
            MetadataField::FullUrl => self.full_url.as_deref(),
        }
    }

    pub fn set(&mut self, field: MetadataField, url: impl Into<String>) {
        match field {
            MetadataField::PreviewUrl => self.preview_url = Some(url.into()),
            MetadataField::FullUrl => self.full_url = Some(url.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_id_validation() {
        assert!(MediaId::from("video_123-abc").is_valid());
        assert!(!MediaId::from("").is_valid());
        assert!(!MediaId::from("../etc").is_valid());
        assert!(!MediaId::from("a".repeat(129)).is_valid());
    }

    #[test]
    fn test_status_round_trip_and_processing_flag() {
        for status in [
            MediaStatus::Pending,
            MediaStatus::Processing,
            MediaStatus::PartiallyPublished,
            MediaStatus::Completed,
            MediaStatus::Failed,
        ] {
            assert_eq!(MediaStatus::parse(status.as_str()), Some(status));
        }
        assert!(!MediaStatus::Completed.is_processing());
        assert!(MediaStatus::Failed.is_processing());
        assert!(MediaStatus::PartiallyPublished.is_processing());
    }

    #[test]
    fn test_media_record_serializes_is_processing() {
        let record = MediaRecord::new(MediaId::from("m1"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["isProcessing"], true);
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_asset_document_id_is_flat() {
        assert_eq!(
            MediaAsset::document_id("m1/tracks/audio_0.mka"),
            "m1__tracks__audio_0.mka"
        );
    }

    #[test]
    fn test_metadata_set_overwrites() {
        let mut meta = MediaMetadata::default();
        meta.set(MetadataField::PreviewUrl, "a");
        meta.set(MetadataField::PreviewUrl, "b");
        assert_eq!(meta.get(MetadataField::PreviewUrl), Some("b"));
        assert_eq!(meta.get(MetadataField::FullUrl), None);
    }
}
