//! Output artifacts produced by the pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::media::{MediaId, MetadataField};
use crate::rendition::RenditionKind;

/// Content kind of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Audio,
    Video,
}

/// Logical role of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// Single audio stream, stream-copied
    ExtractedTrack,
    /// One video stream muxed with one audio stream, stream-copied
    CombinedTrack,
    PreviewRendition,
    FullRendition,
}

impl ArtifactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::ExtractedTrack => "extracted_track",
            ArtifactRole::CombinedTrack => "combined_track",
            ArtifactRole::PreviewRendition => "preview_rendition",
            ArtifactRole::FullRendition => "full_rendition",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extracted_track" => Some(ArtifactRole::ExtractedTrack),
            "combined_track" => Some(ArtifactRole::CombinedTrack),
            "preview_rendition" => Some(ArtifactRole::PreviewRendition),
            "full_rendition" => Some(ArtifactRole::FullRendition),
            _ => None,
        }
    }

    /// Metadata field a rendition overwrites. `None` for appended track roles.
    pub fn metadata_field(&self) -> Option<MetadataField> {
        match self {
            ArtifactRole::PreviewRendition => Some(MetadataField::PreviewUrl),
            ArtifactRole::FullRendition => Some(MetadataField::FullUrl),
            ArtifactRole::ExtractedTrack | ArtifactRole::CombinedTrack => None,
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One produced output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub local_path: PathBuf,
    pub destination_key: String,
    pub content_kind: ContentKind,
    pub role: ArtifactRole,
}

impl Artifact {
    /// Audio-only stream copy of the `ordinal`-th audio stream.
    pub fn extracted_audio(work_dir: &Path, media_id: &MediaId, ordinal: usize) -> Self {
        let file_name = format!("audio_{}.mka", ordinal);
        Self {
            local_path: work_dir.join(&file_name),
            destination_key: format!("{}/tracks/{}", media_id, file_name),
            content_kind: ContentKind::Audio,
            role: ArtifactRole::ExtractedTrack,
        }
    }

    /// Video stream copy of the `ordinal`-th video stream with its paired audio.
    pub fn combined_video(work_dir: &Path, media_id: &MediaId, ordinal: usize) -> Self {
        let file_name = format!("video_{}.mkv", ordinal);
        Self {
            local_path: work_dir.join(&file_name),
            destination_key: format!("{}/tracks/{}", media_id, file_name),
            content_kind: ContentKind::Video,
            role: ArtifactRole::CombinedTrack,
        }
    }

    /// Fixed-name rendition output.
    pub fn rendition(work_dir: &Path, media_id: &MediaId, kind: RenditionKind) -> Self {
        let file_name = format!("{}.mp4", kind.as_str());
        Self {
            local_path: work_dir.join(&file_name),
            destination_key: format!("{}/renditions/{}", media_id, file_name),
            content_kind: ContentKind::Video,
            role: kind.role(),
        }
    }

    /// MIME type used for the upload.
    pub fn content_type(&self) -> &'static str {
        let ext = self
            .local_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match (self.content_kind, ext) {
            (ContentKind::Audio, "mka") => "audio/x-matroska",
            (ContentKind::Audio, "m4a") => "audio/mp4",
            (ContentKind::Audio, _) => "audio/mpeg",
            (ContentKind::Video, "mkv") => "video/x-matroska",
            (ContentKind::Video, "webm") => "video/webm",
            (ContentKind::Video, _) => "video/mp4",
        }
    }
}
