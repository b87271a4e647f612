//! Shared data models for the CapMix backend.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets and their stream layout
//! - Transcript segments produced by speech-to-text
//! - Composition requests and jobs
//! - Access ledger entries and admission outcomes
//! - Encoding and caption styling configuration

pub mod asset;
pub mod caption_style;
pub mod encoding;
pub mod job;
pub mod ledger;
pub mod request;
pub mod transcript;

// Re-export common types
pub use asset::{AudioLayout, AudioStream, MediaAsset, VideoStream};
pub use caption_style::CaptionStyle;
pub use encoding::EncodingConfig;
pub use job::{CompositionJob, JobId, JobOutcome};
pub use ledger::{Admission, AdmissionBasis, LedgerEntry};
pub use request::{
    CaptionFailurePolicy, CompositionRequest, MusicSource, RequestError, DEFAULT_MUSIC_VOLUME,
};
pub use transcript::{normalize_segments, TranscriptSegment};
