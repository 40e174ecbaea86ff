//! FFmpeg CLI wrapper for guest clip processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building, separate from execution
//! - Leading black-frame detection (`TimingAnalyzer`)
//! - Guest-name overlay filters with filter-graph escaping
//! - Clip normalization to a canonical profile (`ClipNormalizer`)
//! - Stream-copy concatenation (`Concatenator`)

pub mod black_detect;
pub mod clip;
pub mod command;
pub mod concat;
pub mod error;
pub mod fs_utils;
pub mod normalize;
pub mod overlay;
pub mod probe;

pub use black_detect::TimingAnalyzer;
pub use clip::{MediaClip, NormalizedClip};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegOutput, FfmpegRunner};
pub use concat::Concatenator;
pub use error::{MediaError, MediaResult};
pub use normalize::ClipNormalizer;
pub use overlay::OverlayStyle;
