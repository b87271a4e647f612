//! Caption overlays.

use std::path::Path;

use capmix_models::{CaptionStyle, TranscriptSegment};

use crate::filters::drawtext;
use crate::timeline::{TextOverlay, Timeline};

/// Add one overlay per transcript segment, each visible during its
/// segment's `[start, end)` window.
///
/// Segments are rendered independently in the order given; overlapping
/// windows simply stack. Video duration and resolution are untouched.
pub fn overlay_captions(timeline: Timeline, segments: &[TranscriptSegment]) -> Timeline {
    timeline.with_overlays(segments.iter().map(TextOverlay::from_segment))
}

/// Build the `-filter_complex` video graph burning in `cues`.
///
/// Each cue pairs an overlay with the file holding its text. Returns
/// `None` when there is nothing to draw.
pub fn build_caption_graph<'a, I>(cues: I, style: &CaptionStyle, input: &str, output: &str) -> Option<String>
where
    I: IntoIterator<Item = (&'a TextOverlay, &'a Path)>,
{
    let stages: Vec<String> = cues
        .into_iter()
        .map(|(overlay, text_file)| drawtext(text_file, style, overlay.start, overlay.end))
        .collect();

    if stages.is_empty() {
        return None;
    }

    Some(format!("[{}]{}[{}]", input, stages.join(","), output))
}
