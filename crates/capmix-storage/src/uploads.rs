//! Upload and output directories.

use std::io;
use std::path::{Path, PathBuf};

use capmix_models::JobId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// A persisted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUpload {
    /// Generated file name inside the uploads directory
    pub key: String,
    /// Absolute location on disk
    pub path: PathBuf,
}

/// Stores uploaded sources and published outputs on the local filesystem.
#[derive(Debug, Clone)]
pub struct UploadStore {
    uploads_dir: PathBuf,
    outputs_dir: PathBuf,
}

impl UploadStore {
    pub fn new(uploads_dir: impl Into<PathBuf>, outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            outputs_dir: outputs_dir.into(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// Create both directories if missing.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.outputs_dir).await?;
        Ok(())
    }

    /// Write uploaded bytes under a fresh key.
    ///
    /// The file only appears under its final name once fully written.
    pub async fn persist(&self, bytes: &[u8], extension: &str) -> StorageResult<StoredUpload> {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::invalid_key(format!("extension {:?}", extension)));
        }

        tokio::fs::create_dir_all(&self.uploads_dir).await?;

        let key = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.uploads_dir.join(&key);
        let partial = self.uploads_dir.join(format!(".{}.partial", key));

        if let Err(e) = tokio::fs::write(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tokio::fs::rename(&partial, &path).await?;

        info!(key = %key, bytes = bytes.len(), "Persisted upload");
        Ok(StoredUpload { key, path })
    }

    /// Where the output for `job_id` is published.
    pub fn output_path(&self, job_id: &JobId) -> PathBuf {
        self.outputs_dir.join(format!("{}.mp4", job_id))
    }

    /// Move an encoded file into the outputs directory.
    pub async fn publish(&self, src: &Path, job_id: &JobId) -> StorageResult<PathBuf> {
        tokio::fs::create_dir_all(&self.outputs_dir).await?;
        let target = self.output_path(job_id);

        move_file(src, &target)
            .await
            .map_err(|e| StorageError::publish_failed(format!("{} -> {}: {}", src.display(), target.display(), e)))?;

        info!(job_id = %job_id, path = %target.display(), "Published output");
        Ok(target)
    }

    /// Delete a stored file. Missing files are not an error.
    pub async fn remove(&self, path: &Path) -> StorageResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Rename, falling back to copy and delete when the rename cannot
/// cross filesystems.
async fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!(error = %e, "Rename failed, copying instead");
            if let Err(copy_err) = tokio::fs::copy(src, dst).await {
                let _ = tokio::fs::remove_file(dst).await;
                return Err(copy_err);
            }
            if let Err(remove_err) = tokio::fs::remove_file(src).await {
                warn!(path = %src.display(), error = %remove_err, "Failed to remove moved source");
            }
            Ok(())
        }
    }
}
