//! Blob storage for published artifacts.
//!
//! This crate provides:
//! - The `BlobStore` seam (overwrite-on-put, stable public URLs)
//! - A Cloudflare R2 implementation over the S3 API
//! - An in-memory implementation for tests and local runs

pub mod client;
pub mod error;
pub mod memory;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryBlobStore, StoredObject};
pub use store::{public_url_for, validate_key, BlobStore};
