//! Worker error types.

use capmix_billing::BillingError;
use capmix_firestore::FirestoreError;
use capmix_media::MediaError;
use capmix_ml_client::MlError;
use capmix_models::RequestError;
use capmix_storage::StorageError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Music asset missing: {0}")]
    MusicAssetMissing(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn unknown_user(user_id: impl Into<String>) -> Self {
        Self::UnknownUser(user_id.into())
    }

    pub fn music_missing(msg: impl Into<String>) -> Self {
        Self::MusicAssetMissing(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Stable snake_case name of the failure, for reports and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::UnsupportedMedia(_) => "unsupported_media",
            WorkerError::TranscriptionUnavailable(_) => "transcription_unavailable",
            WorkerError::Encoding(_) => "encoding",
            WorkerError::MusicAssetMissing(_) => "music_asset_missing",
            WorkerError::UnknownUser(_) => "unknown_user",
            WorkerError::InvalidRequest(_) => "invalid_request",
            WorkerError::JobFailed(_) => "job_failed",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Ledger(_) => "ledger",
            WorkerError::Billing(_) => "billing",
            WorkerError::Storage(_) => "storage",
            WorkerError::Io(_) => "io",
        }
    }
}

impl From<MediaError> for WorkerError {
    fn from(e: MediaError) -> Self {
        if e.is_unsupported_media() {
            WorkerError::UnsupportedMedia(e.to_string())
        } else {
            WorkerError::Encoding(e.to_string())
        }
    }
}

impl From<MlError> for WorkerError {
    fn from(e: MlError) -> Self {
        WorkerError::TranscriptionUnavailable(e.to_string())
    }
}

impl From<FirestoreError> for WorkerError {
    fn from(e: FirestoreError) -> Self {
        WorkerError::Ledger(e.to_string())
    }
}

impl From<RequestError> for WorkerError {
    fn from(e: RequestError) -> Self {
        WorkerError::InvalidRequest(e.to_string())
    }
}
