//! The fixed rendition ladder.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ArtifactRole;
use crate::media::MetadataField;

/// Video codec for every rendition
pub const RENDITION_VIDEO_CODEC: &str = "libx264";
/// Audio codec for every rendition
pub const RENDITION_AUDIO_CODEC: &str = "aac";

/// Which rendition of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenditionKind {
    Preview,
    Full,
}

impl RenditionKind {
    /// Every rendition, in encode order.
    pub const ALL: [RenditionKind; 2] = [RenditionKind::Preview, RenditionKind::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenditionKind::Preview => "preview",
            RenditionKind::Full => "full",
        }
    }

    pub fn role(&self) -> ArtifactRole {
        match self {
            RenditionKind::Preview => ArtifactRole::PreviewRendition,
            RenditionKind::Full => ArtifactRole::FullRendition,
        }
    }

    pub fn metadata_field(&self) -> MetadataField {
        match self {
            RenditionKind::Preview => MetadataField::PreviewUrl,
            RenditionKind::Full => MetadataField::FullUrl,
        }
    }

    pub fn profile(&self) -> RenditionProfile {
        match self {
            RenditionKind::Preview => RenditionProfile::preview(),
            RenditionKind::Full => RenditionProfile::full(),
        }
    }
}

impl fmt::Display for RenditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoding parameters for one rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RenditionProfile {
    pub kind: RenditionKind,
    /// Target width; height follows the aspect ratio, rounded to even
    pub width: u32,
    pub codec: String,
    pub preset: String,
    /// Constant Rate Factor (0-51, lower is better)
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl RenditionProfile {
    /// Bandwidth-constrained preview encode.
    pub fn preview() -> Self {
        Self {
            kind: RenditionKind::Preview,
            width: 640,
            codec: RENDITION_VIDEO_CODEC.to_string(),
            preset: "veryfast".to_string(),
            crf: 28,
            audio_codec: RENDITION_AUDIO_CODEC.to_string(),
            audio_bitrate: "96k".to_string(),
        }
    }

    /// Higher-quality full encode.
    pub fn full() -> Self {
        Self {
            kind: RenditionKind::Full,
            width: 1920,
            codec: RENDITION_VIDEO_CODEC.to_string(),
            preset: "slow".to_string(),
            crf: 20,
            audio_codec: RENDITION_AUDIO_CODEC.to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }

    /// `scale` filter expression. `-2` keeps the aspect ratio with an even height.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:-2", self.width)
    }

    /// Video encoder arguments.
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-vf".to_string(),
            self.scale_filter(),
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]
    }

    /// Audio encoder arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_values() {
        let preview = RenditionKind::Preview.profile();
        assert_eq!(preview.scale_filter(), "scale=640:-2");
        assert_eq!(preview.preset, "veryfast");
        assert_eq!(preview.crf, 28);
        assert_eq!(preview.audio_bitrate, "96k");

        let full = RenditionKind::Full.profile();
        assert_eq!(full.scale_filter(), "scale=1920:-2");
        assert_eq!(full.preset, "slow");
        assert_eq!(full.crf, 20);
        assert_eq!(full.audio_bitrate, "192k");
    }

    #[test]
    fn test_video_args_carry_crf() {
        let args = RenditionProfile::preview().video_args();
        let pos = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[pos + 1], "28");
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_kind_targets_field() {
        assert_eq!(RenditionKind::Preview.metadata_field(), MetadataField::PreviewUrl);
        assert_eq!(RenditionKind::Full.role(), ArtifactRole::FullRendition);
    }
}
