//! FFmpeg filter expression helpers.

use std::path::Path;

use capmix_models::{AudioLayout, CaptionStyle};

/// Padding around caption text inside its background box, in pixels.
const CAPTION_BOX_BORDER: u32 = 12;

/// Quote a path as a filter option value.
///
/// Text inside `'...'` is taken literally, so a quote can only be written
/// by closing the quoted run, escaping it, and reopening: `'it'\''s'`.
pub fn quote_filter_path(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}

/// Timeline expression true during `[start, end)`.
pub fn enable_window(start: f64, end: f64) -> String {
    format!("gte(t,{:.3})*lt(t,{:.3})", start, end)
}

/// `aformat` stage resampling to a fixed layout.
pub fn aformat(layout: &AudioLayout) -> String {
    format!(
        "aformat=sample_fmts=fltp:sample_rates={}:channel_layouts={}",
        layout.sample_rate, layout.channel_layout
    )
}

/// Silent `lavfi` source in the given layout.
pub fn anullsrc(layout: &AudioLayout) -> String {
    format!(
        "anullsrc=r={}:cl={}",
        layout.sample_rate, layout.channel_layout
    )
}

/// `drawtext` stage reading its text verbatim from `text_file`.
///
/// Anchored bottom-center and shown only during `[start, end)`.
pub fn drawtext(text_file: &Path, style: &CaptionStyle, start: f64, end: f64) -> String {
    let mut filter = format!(
        "drawtext=textfile={}:expansion=none",
        quote_filter_path(&text_file.to_string_lossy())
    );

    if let Some(font) = &style.font_file {
        filter.push_str(&format!(
            ":fontfile={}",
            quote_filter_path(&font.to_string_lossy())
        ));
    }

    filter.push_str(&format!(
        ":fontsize={}:fontcolor={}:box=1:boxcolor={}@{:.2}:boxborderw={}",
        style.font_size, style.font_color, style.box_color, style.box_opacity, CAPTION_BOX_BORDER
    ));
    filter.push_str(&format!(
        ":x=(w-text_w)/2:y=h-text_h-{}",
        style.bottom_margin
    ));
    filter.push_str(&format!(":enable='{}'", enable_window(start, end)));

    filter
}
