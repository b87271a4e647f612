//! Music preset store.
//!
//! Presets are plain audio files in one directory, addressed by name.
//! A name may include the extension (`lofi.mp3`) or omit it (`lofi`).

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Extensions tried, in order, for names given without one.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac", "ogg", "flac"];

/// Read-only collection of admin-uploaded music files.
#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the preset called `name`.
    pub async fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;

        let has_extension = Path::new(name).extension().is_some();
        let candidates: Vec<PathBuf> = if has_extension {
            vec![self.dir.join(name)]
        } else {
            AUDIO_EXTENSIONS
                .iter()
                .map(|ext| self.dir.join(format!("{}.{}", name, ext)))
                .collect()
        };

        for candidate in candidates {
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_file() => {
                    debug!(preset = %name, path = %candidate.display(), "Resolved preset");
                    return Ok(candidate);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::not_found(format!("preset {}", name)))
    }

    /// File names of all presets, sorted.
    pub async fn list(&self) -> StorageResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let is_audio = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_audio {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A name must be a single plain path component.
fn validate_name(name: &str) -> StorageResult<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none();

    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) || !single_normal {
        return Err(StorageError::invalid_key(name.to_string()));
    }
    Ok(())
}
