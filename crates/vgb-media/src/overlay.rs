//! Guest-name overlay.
//!
//! The guest name is never interpolated into the filter graph. It is written
//! to a text file next to the normalized output and drawn with
//! `drawtext=textfile=...:expansion=none`, so quotes, backslashes and filter
//! metacharacters in the name have no meaning to FFmpeg. Only paths we
//! generate ourselves go through [`escape_filter_value`].

use std::path::{Path, PathBuf};

/// Longest name drawn on screen, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;
/// Shown when a guest left the name empty.
pub const ANONYMOUS_GUEST: &str = "Guest";

/// Overlay appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub font_size: u32,
    pub font_color: String,
    pub shadow_color: String,
    pub shadow_offset: u32,
    /// Distance from the bottom edge in pixels
    pub bottom_margin: u32,
    /// Font file. When unset, fontconfig resolves `font_family`.
    pub font_file: Option<PathBuf>,
    pub font_family: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 42,
            font_color: "white".to_string(),
            shadow_color: "black@0.75".to_string(),
            shadow_offset: 3,
            bottom_margin: 48,
            font_file: None,
            font_family: "Sans".to_string(),
        }
    }
}

/// Clean up a guest name for display.
///
/// Control characters are dropped, runs of whitespace collapse to one space
/// and the result is clamped to [`MAX_DISPLAY_NAME_CHARS`].
pub fn sanitize_display_name(raw: &str) -> String {
    let collapsed = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let clamped: String = collapsed.chars().take(MAX_DISPLAY_NAME_CHARS).collect();
    if clamped.is_empty() {
        ANONYMOUS_GUEST.to_string()
    } else {
        clamped
    }
}

/// Escape a value for use as a filter option inside a filter graph.
///
/// Two levels apply: the option parser treats `\`, `'` and `:` specially,
/// and the graph parser additionally treats `[`, `]`, `,` and `;`.
pub fn escape_filter_value(value: &str) -> String {
    let option_level = escape_chars(value, &['\\', '\'', ':']);
    escape_chars(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Path of the text file holding the overlay text for `output`.
pub fn text_file_for(output: &Path) -> PathBuf {
    output.with_extension("name.txt")
}

/// `drawtext` filter drawing the contents of `text_file` bottom-center with a shadow.
pub fn build_drawtext_filter(text_file: &Path, style: &OverlayStyle) -> String {
    let font = match &style.font_file {
        Some(path) => format!("fontfile={}", escape_filter_value(&path.to_string_lossy())),
        None => format!("font={}", escape_filter_value(&style.font_family)),
    };

    format!(
        "drawtext={font}:textfile={text}:expansion=none:fontsize={size}:fontcolor={color}:\
         shadowcolor={shadow}:shadowx={offset}:shadowy={offset}:\
         x=(w-text_w)/2:y=h-text_h-{margin}",
        font = font,
        text = escape_filter_value(&text_file.to_string_lossy()),
        size = style.font_size,
        color = style.font_color,
        shadow = style.shadow_color,
        offset = style.shadow_offset,
        margin = style.bottom_margin,
    )
}
