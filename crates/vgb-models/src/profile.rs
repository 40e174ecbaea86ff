//! Canonical output profile.
//!
//! Every normalized clip is encoded with exactly these settings so that the
//! concatenation step can stream-copy without re-encoding.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_AUDIO_CHANNELS: u8 = 2;
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Fixed timebase so every segment shares the same stream timescale.
pub const DEFAULT_TIMESCALE: u32 = 15_360;

/// Encoder settings shared by every normalized clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub preset: String,
    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub audio_channels: u8,
    pub timescale: u32,
}

impl Default for OutputProfile {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            audio_channels: DEFAULT_AUDIO_CHANNELS,
            timescale: DEFAULT_TIMESCALE,
        }
    }
}

impl OutputProfile {
    /// Canvas size as `WxH`, the form lavfi sources expect.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Encoder and muxer arguments appended to every normalization command.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".into(),
            self.video_codec.clone(),
            "-preset".into(),
            self.preset.clone(),
            "-crf".into(),
            self.crf.to_string(),
            "-pix_fmt".into(),
            self.pixel_format.clone(),
            "-r".into(),
            self.fps.to_string(),
            "-fps_mode".into(),
            "cfr".into(),
            "-video_track_timescale".into(),
            self.timescale.to_string(),
            "-c:a".into(),
            self.audio_codec.clone(),
            "-b:a".into(),
            self.audio_bitrate.clone(),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-ac".into(),
            self.audio_channels.to_string(),
            "-avoid_negative_ts".into(),
            "make_zero".into(),
            "-movflags".into(),
            "+faststart".into(),
        ]
    }
}
