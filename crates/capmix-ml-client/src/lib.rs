//! Client for the speech-to-text service used for captions.
//!
//! The service speaks the OpenAI-compatible `/v1/audio/transcriptions`
//! protocol (whisper.cpp server, faster-whisper-server, OpenAI itself).
//! The client is built once at process start and shared read-only.

pub mod client;
pub mod error;
pub mod types;

pub use client::{Transcriber, TranscriptionClient, TranscriptionConfig};
pub use error::{MlError, MlResult};
pub use types::{HealthResponse, VerboseTranscription, WireSegment};
