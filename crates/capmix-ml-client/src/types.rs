//! Wire types for the transcription service.

use capmix_models::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// `response_format=verbose_json` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseTranscription {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<WireSegment>,
}

/// One timed segment as returned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl From<WireSegment> for TranscriptSegment {
    fn from(seg: WireSegment) -> Self {
        TranscriptSegment::new(seg.start, seg.end, seg.text)
    }
}

impl VerboseTranscription {
    /// Segments in engine order.
    pub fn into_segments(self) -> Vec<TranscriptSegment> {
        self.segments.into_iter().map(Into::into).collect()
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
