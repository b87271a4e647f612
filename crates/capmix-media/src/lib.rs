#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the composition pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple (and synthetic) inputs
//! - Progress parsing from `-progress pipe:2`
//! - Source probing into `MediaAsset`s
//! - The composed `Timeline` and its two transforms (music mix, caption overlay)
//! - The encoder adapter that materializes a timeline to an MP4 file

pub mod audio_mix;
pub mod captions;
pub mod command;
pub mod encoder;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod probe;
pub mod progress;
pub mod timeline;

pub use audio_mix::{build_audio_graph, mix_music};
pub use captions::{build_caption_graph, overlay_captions};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encoder::{FfmpegEncoder, MediaEncoder, TRANSCRIPTION_SAMPLE_RATE};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_audio, probe_media};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use timeline::{AudioTrack, MusicBed, TextOverlay, Timeline, VideoTrack};
