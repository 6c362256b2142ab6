//! In-memory blob store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::store::{public_url_for, validate_key, BlobStore};

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    /// Number of puts this key has received
    pub writes: u32,
}

/// `BlobStore` held in process memory.
///
/// Can be told to fail the next N uploads of a key, which the pipeline tests
/// use to exercise retries.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    base_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failures: Arc<RwLock<HashMap<String, u32>>>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("http://localhost/blobs")
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Make the next `times` uploads of `key` fail.
    pub async fn fail_uploads(&self, key: impl Into<String>, times: u32) {
        self.failures.write().await.insert(key.into(), times);
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn take_failure(&self, key: &str) -> bool {
        let mut failures = self.failures.write().await;
        match failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    async fn store(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        if self.take_failure(key).await {
            return Err(StorageError::upload_failed(format!("injected failure for {}", key)));
        }

        let mut objects = self.objects.write().await;
        let writes = objects.get(key).map(|o| o.writes).unwrap_or(0) + 1;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                writes,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;
        self.store(data, key, content_type).await
    }

    async fn put_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
        self.store(data, key, content_type).await
    }

    fn public_url(&self, key: &str) -> String {
        public_url_for(&self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_overwrites_and_url_is_stable() {
        let store = MemoryBlobStore::new("https://cdn.test");
        let key = "m1/renditions/preview.mp4";

        store.put_bytes(b"one".to_vec(), key, "video/mp4").await.unwrap();
        let first_url = store.public_url(key);
        store.put_bytes(b"two".to_vec(), key, "video/mp4").await.unwrap();

        let object = store.get(key).await.unwrap();
        assert_eq!(object.data, b"two");
        assert_eq!(object.writes, 2);
        assert_eq!(store.public_url(key), first_url);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_file_reads_local_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio_0.mka");
        tokio::fs::write(&path, b"matroska").await.unwrap();

        let store = MemoryBlobStore::default();
        store
            .put_file(&path, "m1/tracks/audio_0.mka", "audio/x-matroska")
            .await
            .unwrap();
        assert_eq!(store.get("m1/tracks/audio_0.mka").await.unwrap().data, b"matroska");
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryBlobStore::default();
        store.fail_uploads("k", 1).await;

        let err = store.put_bytes(vec![1], "k", "video/mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed(_)));
        store.put_bytes(vec![1], "k", "video/mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_an_upload_error() {
        let store = MemoryBlobStore::default();
        let err = store
            .put_file(Path::new("/nonexistent/reel.bin"), "k", "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed(_)));
    }
}
