//! The composed asset.
//!
//! A `Timeline` is the source `MediaAsset` plus the edits the transforms
//! have layered on top of it. Nothing is rendered until the encoder
//! materializes it, so transforms stay pure and cheap.

use std::path::{Path, PathBuf};

use capmix_models::{AudioLayout, MediaAsset, TranscriptSegment};
use serde::{Deserialize, Serialize};

/// A text overlay shown during `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TextOverlay {
    /// Overlay covering exactly the segment's window.
    pub fn from_segment(segment: &TranscriptSegment) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
        }
    }

    /// Whether the overlay is on screen at time `t`.
    pub fn is_visible_at(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Edits applied to the source video stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    /// Overlays in render order; later ones stack on top.
    pub overlays: Vec<TextOverlay>,
}

/// Background music layered under the narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicBed {
    /// Decodable audio file (preset, upload or synthesized silence)
    pub path: PathBuf,
    /// Gain in (0, 1]
    pub volume: f32,
}

impl MusicBed {
    pub fn new(path: impl Into<PathBuf>, volume: f32) -> Self {
        Self {
            path: path.into(),
            volume,
        }
    }
}

/// Audio of the composed asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioTrack {
    /// Source audio as-is (or none, for silent sources)
    #[default]
    Source,
    /// Source audio mixed with a music bed
    Mixed(MusicBed),
}

/// A source asset plus pending edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    source: MediaAsset,
    video: VideoTrack,
    audio: AudioTrack,
}

impl Timeline {
    /// Timeline with no edits.
    pub fn from_source(source: MediaAsset) -> Self {
        Self {
            source,
            video: VideoTrack::default(),
            audio: AudioTrack::Source,
        }
    }

    /// The underlying source asset.
    pub fn source(&self) -> &MediaAsset {
        &self.source
    }

    /// Source file path.
    pub fn source_path(&self) -> &Path {
        self.source.path()
    }

    /// Duration of the composed asset. Always the source duration.
    pub fn duration(&self) -> f64 {
        self.source.duration
    }

    pub fn overlays(&self) -> &[TextOverlay] {
        &self.video.overlays
    }

    pub fn audio(&self) -> &AudioTrack {
        &self.audio
    }

    /// Music bed, if one was mixed in.
    pub fn music(&self) -> Option<&MusicBed> {
        match &self.audio {
            AudioTrack::Mixed(bed) => Some(bed),
            AudioTrack::Source => None,
        }
    }

    /// Whether the composed asset will carry any audio.
    pub fn has_audio(&self) -> bool {
        self.source.has_audio() || self.music().is_some()
    }

    /// Layout the composed audio is rendered in.
    pub fn audio_layout(&self) -> AudioLayout {
        self.source.audio_layout()
    }

    /// No edits; the encoder only normalizes the format.
    pub fn is_passthrough(&self) -> bool {
        self.video.overlays.is_empty() && self.music().is_none()
    }

    pub(crate) fn with_audio(mut self, audio: AudioTrack) -> Self {
        self.audio = audio;
        self
    }

    pub(crate) fn with_overlays(mut self, overlays: impl IntoIterator<Item = TextOverlay>) -> Self {
        self.video.overlays.extend(overlays);
        self
    }
}
