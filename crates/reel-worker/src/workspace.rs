//! Per-job scratch directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, warn};

use reel_models::MediaId;

use crate::error::{WorkerError, WorkerResult};

/// Workspace directories held by a live job in this process.
fn held() -> &'static Mutex<HashSet<PathBuf>> {
    static HELD: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(HashSet::new()))
}

fn hold(dir: &Path) -> bool {
    held()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(dir.to_path_buf())
}

fn release(dir: &Path) {
    held()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(dir);
}

/// Scratch directory `<work_dir>/<media_id>` owned by one job.
///
/// Removed by [`JobWorkspace::cleanup`] or, if that never runs, on drop.
/// At most one job in the process holds a given directory.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    released: bool,
}

impl JobWorkspace {
    /// Create a fresh directory, replacing leftovers from an earlier attempt.
    ///
    /// Fails while another job in this process still holds the directory.
    pub async fn create(work_dir: &Path, media_id: &MediaId) -> WorkerResult<Self> {
        if !media_id.is_valid() {
            return Err(WorkerError::workspace(format!("unsafe media id: {}", media_id)));
        }
        let dir = work_dir.join(media_id.as_str());
        if !hold(&dir) {
            return Err(WorkerError::workspace(format!(
                "workspace {} is held by another job",
                dir.display()
            )));
        }
        let workspace = Self { dir, released: false };

        if tokio::fs::try_exists(&workspace.dir).await? {
            debug!(dir = %workspace.dir.display(), "Removing stale workspace");
            tokio::fs::remove_dir_all(&workspace.dir).await?;
        }
        tokio::fs::create_dir_all(&workspace.dir).await?;

        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write the uploaded bytes to `source.<ext>`.
    pub async fn stage_source(&self, data: &[u8], extension: &str) -> WorkerResult<PathBuf> {
        let path = self.dir.join(format!("source.{}", extension));
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), bytes = data.len(), "Staged source");
        Ok(path)
    }

    /// Remove the directory and everything in it.
    pub async fn cleanup(mut self) -> WorkerResult<()> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), "Failed to remove workspace: {}", e);
                }
            }
        }
        release(&self.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_stage_cleanup() {
        let root = TempDir::new().unwrap();
        let workspace = JobWorkspace::create(root.path(), &MediaId::from("m1")).await.unwrap();
        let dir = workspace.path().to_path_buf();
        assert_eq!(dir, root.path().join("m1"));

        let source = workspace.stage_source(b"bytes", "mp4").await.unwrap();
        assert_eq!(source, dir.join("source.mp4"));
        assert_eq!(std::fs::read(&source).unwrap(), b"bytes");

        workspace.cleanup().await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = TempDir::new().unwrap();
        let dir = {
            let workspace = JobWorkspace::create(root.path(), &MediaId::from("m2")).await.unwrap();
            workspace.stage_source(b"x", "mov").await.unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_stale_directory_is_replaced() {
        let root = TempDir::new().unwrap();
        let stale = root.path().join("m3");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("audio_0.mka"), b"old").unwrap();

        let workspace = JobWorkspace::create(root.path(), &MediaId::from("m3")).await.unwrap();
        assert!(!workspace.path().join("audio_0.mka").exists());
        workspace.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_held_directory_is_not_reused() {
        let root = TempDir::new().unwrap();
        let media = MediaId::from("m4");
        let first = JobWorkspace::create(root.path(), &media).await.unwrap();
        let source = first.stage_source(b"live", "mp4").await.unwrap();

        let err = JobWorkspace::create(root.path(), &media).await.unwrap_err();
        assert!(matches!(err, WorkerError::Workspace(_)));
        assert_eq!(std::fs::read(&source).unwrap(), b"live");

        first.cleanup().await.unwrap();
        let second = JobWorkspace::create(root.path(), &media).await.unwrap();
        second.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_media_id() {
        let root = TempDir::new().unwrap();
        let err = JobWorkspace::create(root.path(), &MediaId::from("../escape")).await.unwrap_err();
        assert!(matches!(err, WorkerError::Workspace(_)));
    }
}
