//! Firestore REST API client.
//!
//! This crate provides:
//! - Service account authentication via gcp_auth (or the local emulator)
//! - A single-flight token cache and retry with backoff
//! - The access ledger repository with optimistic-lock credit consumption

pub mod client;
pub mod error;
pub mod ledger_repo;
pub mod metrics;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use ledger_repo::{ConsumeOutcome, LedgerRepository};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
