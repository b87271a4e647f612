//! Media pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// FFmpeg invocations by operation and outcome.
    pub const FFMPEG_RUNS_TOTAL: &str = "capmix_ffmpeg_runs_total";

    /// FFmpeg wall-clock time in seconds by operation.
    pub const FFMPEG_DURATION_SECONDS: &str = "capmix_ffmpeg_duration_seconds";

    /// Caption overlays rendered per encode.
    pub const CAPTION_OVERLAYS: &str = "capmix_caption_overlays";
}

/// Record a finished FFmpeg run.
pub fn record_ffmpeg_run(operation: &str, success: bool, elapsed_secs: f64) {
    let status = if success { "success" } else { "failure" };

    counter!(
        names::FFMPEG_RUNS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        names::FFMPEG_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(elapsed_secs);
}

/// Record how many overlays an encode burned in.
pub fn record_caption_overlays(count: usize) {
    histogram!(names::CAPTION_OVERLAYS).record(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::FFMPEG_RUNS_TOTAL.ends_with("_total"));
        assert!(names::FFMPEG_DURATION_SECONDS.ends_with("_seconds"));
    }
}
