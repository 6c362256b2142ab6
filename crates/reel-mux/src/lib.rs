//! Client for the Mux Video API.
//!
//! The managed encoding path pushes the raw upload to Mux through a direct
//! upload URL and polls until the resulting asset is playable.

pub mod client;
pub mod error;
pub mod poll;
pub mod types;

pub use client::{MuxClient, MuxConfig};
pub use error::{MuxError, MuxResult};
pub use poll::{wait_until_ready, PollError, PollStatus};
pub use types::{Asset, AssetStatus, DirectUpload, PlaybackId, UploadStatus};
