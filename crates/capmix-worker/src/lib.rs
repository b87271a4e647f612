//! Composition worker.
//!
//! This crate provides:
//! - The access gate (credit ledger + checkout fallback)
//! - The composition engine sequencing the music and caption transforms
//! - The job executor: admit, compose, encode, publish
//! - Configuration, structured job logging and metrics

pub mod access;
pub mod compose;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;

pub use access::{AccessGate, Consumption, CreditLedger, FirestoreLedger, InMemoryLedger};
pub use compose::CompositionEngine;
pub use config::{CheckoutBackend, LedgerBackend, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
