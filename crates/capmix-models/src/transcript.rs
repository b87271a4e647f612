//! Timed transcript segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A piece of recognized speech with its time window in seconds.
///
/// The window is half-open: the text belongs to `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Length of the window in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Check `0 <= start < end <= duration` and that there is text to show.
    pub fn is_valid_within(&self, duration: f64) -> bool {
        self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.start < self.end
            && self.end <= duration
            && !self.text.trim().is_empty()
    }
}

/// Bring raw engine output in line with the segment invariants.
///
/// Text is trimmed, negative starts become zero, ends are clamped to the
/// source duration, and segments left empty or zero-length are dropped.
/// The result is ordered by start time; ties keep engine order.
pub fn normalize_segments(segments: Vec<TranscriptSegment>, duration: f64) -> Vec<TranscriptSegment> {
    let mut out: Vec<TranscriptSegment> = segments
        .into_iter()
        .filter_map(|seg| {
            if !seg.start.is_finite() || !seg.end.is_finite() {
                return None;
            }
            let seg = TranscriptSegment {
                start: seg.start.max(0.0),
                end: seg.end.min(duration),
                text: seg.text.trim().to_string(),
            };
            seg.is_valid_within(duration).then_some(seg)
        })
        .collect();

    out.sort_by(|a, b| a.start.total_cmp(&b.start));
    out
}
