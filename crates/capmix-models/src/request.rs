//! Composition request descriptor.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Default background music gain.
pub const DEFAULT_MUSIC_VOLUME: f32 = 0.2;

/// Where the background music comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MusicSource {
    /// Admin-uploaded preset, looked up by name in the preset store
    Preset(String),
    /// User-uploaded file
    File(PathBuf),
}

/// What to do when the transcription engine fails for a job that asked for captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionFailurePolicy {
    /// Fail the job
    #[default]
    Propagate,
    /// Render the job without captions
    Degrade,
}

/// Errors raised by request validation.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Flags and parameters for one composition job.
///
/// Read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CompositionRequest {
    /// Burn transcribed captions into the video
    #[serde(default)]
    pub add_captions: bool,

    /// Mix background music under the existing audio
    #[serde(default)]
    pub add_music: bool,

    /// Music to mix; synthesized silence is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicSource>,

    /// Gain applied to the music, in (0, 1]
    #[serde(default = "default_music_volume")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub music_volume: f32,

    /// Caption failure handling
    #[serde(default)]
    pub caption_failure: CaptionFailurePolicy,
}

fn default_music_volume() -> f32 {
    DEFAULT_MUSIC_VOLUME
}

impl Default for CompositionRequest {
    fn default() -> Self {
        Self {
            add_captions: false,
            add_music: false,
            music: None,
            music_volume: DEFAULT_MUSIC_VOLUME,
            caption_failure: CaptionFailurePolicy::Propagate,
        }
    }
}

impl CompositionRequest {
    /// Create a request with no transforms (normalizing re-encode only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable caption overlay.
    pub fn with_captions(mut self) -> Self {
        self.add_captions = true;
        self
    }

    /// Enable music mixing with an optional source.
    pub fn with_music(mut self, music: Option<MusicSource>) -> Self {
        self.add_music = true;
        self.music = music;
        self
    }

    /// Set the music gain.
    pub fn with_music_volume(mut self, volume: f32) -> Self {
        self.music_volume = volume;
        self
    }

    /// Degrade to "no captions" instead of failing when transcription fails.
    pub fn with_caption_failure(mut self, policy: CaptionFailurePolicy) -> Self {
        self.caption_failure = policy;
        self
    }

    /// Whether any transform will run.
    pub fn is_passthrough(&self) -> bool {
        !self.add_captions && !self.add_music
    }

    /// Validate field ranges.
    pub fn check(&self) -> Result<(), RequestError> {
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request_is_passthrough() {
        let req = CompositionRequest::default();
        assert!(req.is_passthrough());
        assert!((req.music_volume - 0.2).abs() < f32::EPSILON);
        assert_eq!(req.caption_failure, CaptionFailurePolicy::Propagate);
        assert!(req.check().is_ok());
    }

    #[test]
    fn test_volume_range() {
        assert!(CompositionRequest::new().with_music_volume(1.0).check().is_ok());
        assert!(CompositionRequest::new().with_music_volume(0.0).check().is_err());
        assert!(CompositionRequest::new().with_music_volume(1.5).check().is_err());
        assert!(CompositionRequest::new().with_music_volume(-0.1).check().is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let req: CompositionRequest =
            serde_json::from_str(r#"{"add_music": true}"#).unwrap();
        assert!(req.add_music);
        assert!(!req.add_captions);
        assert!(req.music.is_none());
        assert!((req.music_volume - DEFAULT_MUSIC_VOLUME).abs() < f32::EPSILON);
    }

    #[test]
    fn test_music_source_serde() {
        let src = MusicSource::Preset("lofi".to_string());
        let json = serde_json::to_string(&src).unwrap();
        assert_eq!(json, r#"{"kind":"preset","value":"lofi"}"#);
    }
}
