//! Per-job scratch directories.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::StorageResult;

/// Scratch directory owned by one job.
///
/// Everything inside is deleted when the workspace is dropped, whichever
/// way the job ends.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a workspace under `root`, named after the job.
    pub async fn create(root: &Path, job_id: &str) -> StorageResult<Self> {
        tokio::fs::create_dir_all(root).await?;

        let root = root.to_path_buf();
        let prefix = format!("job-{}-", job_id);
        let dir = tokio::task::spawn_blocking(move || tempfile::Builder::new().prefix(&prefix).tempdir_in(&root))
            .await
            .map_err(std::io::Error::other)??;

        debug!(path = %dir.path().display(), "Created job workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a named file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Audio extracted for transcription.
    pub fn transcription_audio(&self) -> PathBuf {
        self.file("narration.wav")
    }

    /// Synthesized silence standing in for missing music.
    pub fn silence_track(&self) -> PathBuf {
        self.file("silence.wav")
    }

    /// Encoder target before publishing.
    pub fn encoded_output(&self) -> PathBuf {
        self.file("output.mp4")
    }

    /// Remove the workspace now, reporting failures instead of ignoring them.
    pub async fn close(self) -> StorageResult<()> {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        let result = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(std::io::Error::other)?;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to remove job workspace");
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = JobWorkspace::create(root.path(), "j1").await.unwrap();
            std::fs::write(ws.encoded_output(), b"partial").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_removed_on_error_path() {
        fn failing_job(ws: &JobWorkspace) -> Result<(), String> {
            std::fs::write(ws.silence_track(), b"pcm").unwrap();
            Err("encode failed".to_string())
        }

        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(root.path(), "j2").await.unwrap();
        let path = ws.path().to_path_buf();
        assert!(failing_job(&ws).is_err());
        drop(ws);

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_close() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(&root.path().join("nested"), "j3").await.unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("job-j3-"));
        ws.close().await.unwrap();
        assert!(!path.exists());
    }
}
