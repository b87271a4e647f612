//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const ADMISSIONS_TOTAL: &str = "capmix_admissions_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "capmix_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "capmix_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "capmix_job_duration_seconds";
    pub const MUSIC_FALLBACKS_TOTAL: &str = "capmix_music_fallbacks_total";
    pub const CAPTIONS_DEGRADED_TOTAL: &str = "capmix_captions_degraded_total";
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record an access gate decision (`subscription`, `credit` or `payment_required`).
pub fn record_admission(outcome: &'static str) {
    counter!(names::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "completed").record(duration_secs);
}

pub fn record_job_failed(kind: &'static str, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "failed").record(duration_secs);
}

/// Music could not be loaded and silence was mixed instead.
pub fn record_music_fallback() {
    counter!(names::MUSIC_FALLBACKS_TOTAL).increment(1);
}

/// Transcription failed and the job went ahead without captions.
pub fn record_captions_degraded() {
    counter!(names::CAPTIONS_DEGRADED_TOTAL).increment(1);
}
