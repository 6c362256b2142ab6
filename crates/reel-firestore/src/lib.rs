//! Firestore REST API client and media record store.
//!
//! This crate provides:
//! - A REST client with token caching, retry with jitter and request metrics
//! - Typed repositories for media, assets, metadata and the publication ledger
//! - The `MediaStore` seam the publisher writes through, with a Firestore
//!   implementation and an in-memory one

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::MemoryMediaStore;
pub use repos::{AssetRepository, MediaRepository, MetadataRepository, PublicationRepository};
pub use store::{AppendOutcome, FirestoreMediaStore, MediaStore, Publication};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
