//! Mux API request/response types.

use serde::{Deserialize, Serialize};

/// Every Mux response wraps its payload in `data`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateUploadRequest<'a> {
    pub cors_origin: &'a str,
    pub new_asset_settings: NewAssetSettings,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewAssetSettings {
    pub playback_policy: Vec<String>,
}

/// Upload lifecycle on the Mux side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Waiting,
    AssetCreated,
    Errored,
    Cancelled,
    TimedOut,
    #[serde(other)]
    Unknown,
}

/// A direct upload slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectUpload {
    pub id: String,
    /// Signed URL the file is PUT to; only present on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: UploadStatus,
    /// Set once Mux has created the asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
}

/// Asset lifecycle on the Mux side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Preparing,
    Ready,
    Errored,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackId {
    pub id: String,
    pub policy: String,
}

/// An encoded asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub status: AssetStatus,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
}

impl Asset {
    /// HLS URL of the first playback id.
    pub fn stream_url(&self) -> Option<String> {
        self.playback_ids
            .first()
            .map(|p| format!("https://stream.mux.com/{}.m3u8", p.id))
    }
}
