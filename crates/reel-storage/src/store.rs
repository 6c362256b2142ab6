//! The blob storage seam.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Object storage with overwrite semantics.
///
/// Writing the same key twice replaces the object, and `public_url` depends
/// only on the key, so a retried publish yields the same URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under `key`.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Upload an in-memory buffer under `key`.
    async fn put_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()>;

    /// Public URL an object is served from.
    fn public_url(&self, key: &str) -> String;
}

/// Reject keys that would escape the bucket prefix or produce odd URLs.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Join a public base URL and an object key, percent-encoding each segment.
pub fn public_url_for(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_joins_cleanly() {
        assert_eq!(
            public_url_for("https://cdn.example.com/", "m1/renditions/full.mp4"),
            "https://cdn.example.com/m1/renditions/full.mp4"
        );
        assert_eq!(
            public_url_for("https://cdn.example.com", "m 1/a.mka"),
            "https://cdn.example.com/m%201/a.mka"
        );
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("m1/tracks/audio_0.mka").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("m1/../other").is_err());
        assert!(validate_key("m1//double").is_err());
    }
}
