//! Local filesystem storage.
//!
//! This crate provides:
//! - Upload persistence and output publishing
//! - Per-job scratch workspaces, removed on drop
//! - The read-only music preset store

pub mod error;
pub mod presets;
pub mod uploads;
pub mod workspace;

pub use error::{StorageError, StorageResult};
pub use presets::PresetStore;
pub use uploads::{StoredUpload, UploadStore};
pub use workspace::JobWorkspace;
