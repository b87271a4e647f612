//! Composition job definitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CompositionRequest;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One incoming composition job (one upload).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompositionJob {
    /// Unique job ID
    pub id: JobId,
    /// Requesting user
    pub user_id: String,
    /// Uploaded source clip
    pub input: PathBuf,
    /// Enhancement flags
    pub request: CompositionRequest,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CompositionJob {
    pub fn new(user_id: impl Into<String>, input: impl Into<PathBuf>, request: CompositionRequest) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            input: input.into(),
            request,
            created_at: Utc::now(),
        }
    }
}

/// Terminal result of a job that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Output written
    Completed {
        job_id: JobId,
        output: PathBuf,
        duration: f64,
    },
    /// Not admitted; the client should be redirected to checkout
    PaymentRequired { job_id: JobId, checkout_url: String },
}
