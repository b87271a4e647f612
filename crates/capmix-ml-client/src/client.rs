//! Transcription service HTTP client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use capmix_models::TranscriptSegment;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{MlError, MlResult};
use crate::types::VerboseTranscription;

const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";

/// Speech-to-text over one audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Timed segments for the audio at `audio_path`, in engine order.
    ///
    /// May take longer than the audio itself.
    async fn transcribe(&self, audio_path: &Path) -> MlResult<Vec<TranscriptSegment>>;
}

/// Configuration for the transcription client.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Base URL of the transcription service
    pub base_url: String,
    /// Model name sent with every request
    pub model: String,
    /// Spoken language hint (ISO-639-1); auto-detect when unset
    pub language: Option<String>,
    /// Bearer token, if the service requires one
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries on transport failure
    pub max_retries: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            model: "whisper-1".to_string(),
            language: None,
            api_key: None,
            timeout: Duration::from_secs(600),
            max_retries: 2,
        }
    }
}

impl TranscriptionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TRANSCRIPTION_URL").unwrap_or(defaults.base_url),
            model: std::env::var("TRANSCRIPTION_MODEL").unwrap_or(defaults.model),
            language: std::env::var("TRANSCRIPTION_LANGUAGE")
                .ok()
                .filter(|s| !s.is_empty()),
            api_key: std::env::var("TRANSCRIPTION_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout: std::env::var("TRANSCRIPTION_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("TRANSCRIPTION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Client for an OpenAI-compatible transcription service.
pub struct TranscriptionClient {
    http: Client,
    config: TranscriptionConfig,
}

impl TranscriptionClient {
    /// Create a new client.
    pub fn new(config: TranscriptionConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(TranscriptionConfig::from_env())
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the transcription service is reachable.
    pub async fn health_check(&self) -> MlResult<bool> {
        match self.http.get(self.url("/health")).send().await {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                warn!("Transcription service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Transcription service health check error: {}", e);
                Ok(false)
            }
        }
    }

    fn build_form(&self, audio: Vec<u8>, file_name: &str) -> MlResult<Form> {
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/wav")
            .map_err(MlError::Network)?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        Ok(form)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Transcription request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Transcriber for TranscriptionClient {
    async fn transcribe(&self, audio_path: &Path) -> MlResult<Vec<TranscriptSegment>> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());
        let url = self.url(TRANSCRIPTIONS_PATH);

        debug!(url = %url, bytes = audio.len(), "Sending transcription request");

        let response = self
            .with_retry(|| async {
                let mut request = self
                    .http
                    .post(&url)
                    .multipart(self.build_form(audio.clone(), &file_name)?);
                if let Some(key) = &self.config.api_key {
                    request = request.bearer_auth(key);
                }
                request.send().await.map_err(MlError::Network)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body = response.bytes().await?;
        let transcription: VerboseTranscription = serde_json::from_slice(&body)
            .map_err(|e| MlError::unavailable(format!("undecodable transcription payload: {}", e)))?;

        let segments = transcription.into_segments();
        info!(segments = segments.len(), "Transcription complete");
        Ok(segments)
    }
}

/// Map a non-success response to an error.
fn status_error(status: StatusCode, body: String) -> MlError {
    if status.is_server_error()
        || status == StatusCode::UNPROCESSABLE_ENTITY
        || status == StatusCode::UNSUPPORTED_MEDIA_TYPE
        || status == StatusCode::BAD_REQUEST
    {
        MlError::unavailable(format!("engine returned {}: {}", status, body))
    } else {
        MlError::RequestFailed(format!("transcription service returned {}: {}", status, body))
    }
}
