//! Media asset handles.
//!
//! A `MediaAsset` describes decodable audio+video content on disk. It is
//! produced by probing a file and is moved (never shared) from one pipeline
//! stage to the next.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default sample rate used when no source audio layout is available.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Default channel layout used when no source audio layout is available.
pub const DEFAULT_CHANNEL_LAYOUT: &str = "stereo";

/// Video stream attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoStream {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Codec name as reported by the decoder
    pub codec: String,
}

/// Audio stream attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioStream {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u32,
    /// Channel layout name (e.g. "stereo", "mono", "5.1")
    pub channel_layout: String,
    /// Codec name as reported by the decoder
    pub codec: String,
}

impl AudioStream {
    /// Sample format the stream should be resampled to when mixed.
    pub fn layout(&self) -> AudioLayout {
        AudioLayout {
            sample_rate: self.sample_rate,
            channel_layout: self.channel_layout.clone(),
        }
    }
}

/// Sample rate and channel layout pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AudioLayout {
    pub sample_rate: u32,
    pub channel_layout: String,
}

impl Default for AudioLayout {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_layout: DEFAULT_CHANNEL_LAYOUT.to_string(),
        }
    }
}

/// Handle to decodable video+audio content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaAsset {
    /// Location of the content
    pub path: PathBuf,
    /// Duration in seconds (>= 0)
    pub duration: f64,
    /// Primary video stream
    pub video: VideoStream,
    /// Primary audio stream, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioStream>,
}

impl MediaAsset {
    /// Whether the asset carries an audio track.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout the composed audio track must use.
    ///
    /// Follows the source audio when present, otherwise the default
    /// stereo 44.1 kHz layout.
    pub fn audio_layout(&self) -> AudioLayout {
        self.audio
            .as_ref()
            .map(AudioStream::layout)
            .unwrap_or_default()
    }
}
