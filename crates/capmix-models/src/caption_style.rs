//! Caption rendering style.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Visual style for burned-in captions.
///
/// Captions are always anchored bottom-center; only the look is configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    /// Font size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Font colour (FFmpeg colour syntax)
    #[serde(default = "default_font_color")]
    pub font_color: String,
    /// Background box colour (FFmpeg colour syntax)
    #[serde(default = "default_box_color")]
    pub box_color: String,
    /// Background box opacity (0.0 to 1.0)
    #[serde(default = "default_box_opacity")]
    pub box_opacity: f32,
    /// Distance from the bottom edge in pixels
    #[serde(default = "default_bottom_margin")]
    pub bottom_margin: u32,
    /// Font file; fontconfig default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_file: Option<PathBuf>,
}

fn default_font_size() -> u32 {
    48
}
fn default_font_color() -> String {
    "white".to_string()
}
fn default_box_color() -> String {
    "black".to_string()
}
fn default_box_opacity() -> f32 {
    0.5
}
fn default_bottom_margin() -> u32 {
    60
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            font_color: default_font_color(),
            box_color: default_box_color(),
            box_opacity: default_box_opacity(),
            bottom_margin: default_bottom_margin(),
            font_file: None,
        }
    }
}

impl CaptionStyle {
    /// Set the font size.
    pub fn with_font_size(mut self, size: u32) -> Self {
        self.font_size = size;
        self
    }

    /// Set the background box opacity (clamped to 0.0..=1.0).
    pub fn with_box_opacity(mut self, opacity: f32) -> Self {
        self.box_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Use a specific font file.
    pub fn with_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_file = Some(path.into());
        self
    }
}
