//! Shared data models for the reel transcode pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job and media identifiers
//! - Probed elementary streams and the extraction plan over them
//! - Produced artifacts and their destination keys
//! - The fixed rendition ladder
//! - Persisted records (media, assets, metadata)
//! - Queue signal events

pub mod artifact;
pub mod event;
pub mod job;
pub mod media;
pub mod rendition;
pub mod stream;

// Re-export common types
pub use artifact::{Artifact, ArtifactRole, ContentKind};
pub use event::{JobEvent, JobEventKind};
pub use job::{JobId, JobState};
pub use media::{AssetType, MediaAsset, MediaId, MediaMetadata, MediaRecord, MediaStatus, MetadataField};
pub use rendition::{RenditionKind, RenditionProfile};
pub use stream::{CombinedPair, ProbedStream, StreamKind, StreamLayout};
