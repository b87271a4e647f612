//! Structured job logging.
//!
//! Every lifecycle event carries the job ID, user and operation so a job
//! can be followed through the logs end to end.

use capmix_models::JobId;
use tracing::{error, info, warn, Span};

/// Job logger with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    user_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, user_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log a failure with its stable kind.
    pub fn log_failure(&self, kind: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = %self.operation,
            kind = kind,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping everything the job does.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            user_id = %self.user_id,
            operation = %self.operation
        )
    }
}
