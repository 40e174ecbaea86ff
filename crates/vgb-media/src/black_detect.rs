//! Leading black-frame detection.
//!
//! Browser recordings usually start with a few dark frames while the camera
//! warms up. `TimingAnalyzer` finds where the first black segment ends and
//! returns a trim offset. Detection never fails a clip: when the detector
//! errors or finds nothing, a fixed fallback trim is used.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};

/// Minimum black segment duration in seconds (`d`).
pub const BLACK_MIN_DURATION: f64 = 0.1;
/// Ratio of black pixels for a frame to count as black (`pic_th`).
pub const BLACK_PICTURE_THRESHOLD: f64 = 0.98;
/// Luminance threshold for a pixel to count as black (`pix_th`).
pub const BLACK_PIXEL_THRESHOLD: f64 = 0.10;
/// Added after the detected black end.
pub const TRIM_MARGIN_SECS: f64 = 0.05;
/// Trim applied when nothing was detected.
pub const FALLBACK_TRIM_SECS: f64 = 0.2;

fn black_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"black_end:\s*(-?[0-9]+(?:\.[0-9]+)?)").expect("valid regex"))
}

/// Build the analysis command for `input`.
pub fn build_blackdetect_command(input: &Path) -> FfmpegCommand {
    FfmpegCommand::null_output()
        .log_level("info")
        .input(FfmpegInput::file(input))
        .video_filter(format!(
            "blackdetect=d={}:pic_th={}:pix_th={}",
            BLACK_MIN_DURATION, BLACK_PICTURE_THRESHOLD, BLACK_PIXEL_THRESHOLD
        ))
        .no_audio()
        .format("null")
}

/// End timestamp of the first black segment reported in FFmpeg's log.
pub fn parse_first_black_end(stderr: &str) -> Option<f64> {
    stderr
        .lines()
        .filter(|line| line.contains("blackdetect"))
        .find_map(|line| {
            black_end_regex()
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        })
        .filter(|end| end.is_finite() && *end >= 0.0)
}

/// Trim offset for a detection result.
pub fn trim_start_for(black_end: Option<f64>) -> f64 {
    match black_end {
        Some(end) => end + TRIM_MARGIN_SECS,
        None => FALLBACK_TRIM_SECS,
    }
}

/// Finds the trim-start offset of video clips.
#[derive(Debug, Clone, Default)]
pub struct TimingAnalyzer {
    runner: FfmpegRunner,
}

impl TimingAnalyzer {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Seconds to skip at the start of `input`. Never fails.
    pub async fn trim_start(&self, input: &Path) -> f64 {
        let cmd = build_blackdetect_command(input);
        let black_end = match self.runner.run(&cmd).await {
            Ok(output) => parse_first_black_end(&output.stderr),
            Err(e) => {
                warn!(
                    path = %input.display(),
                    error = %e,
                    "Black-frame detection failed, using fallback trim"
                );
                None
            }
        };

        let trim = trim_start_for(black_end);
        debug!(
            path = %input.display(),
            black_end = ?black_end,
            trim_start = trim,
            "Computed trim start"
        );
        trim
    }
}
