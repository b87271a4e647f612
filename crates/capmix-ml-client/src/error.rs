//! Transcription client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    /// The engine could not process the audio (bad format, corrupt stream,
    /// engine down).
    #[error("Transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MlError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::TranscriptionUnavailable(message.into())
    }

    /// Transport-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(!MlError::unavailable("corrupt stream").is_retryable());
        assert!(!MlError::InvalidResponse("bad".into()).is_retryable());
    }
}
