//! Media processing errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    /// `ffmpeg` or `ffprobe` is not installed.
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("FFmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        /// Tail of the process log
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Input file missing: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("FFmpeg killed after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Captured log output of the failing tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed { stderr, .. } | Self::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_only_for_tool_failures() {
        let err = MediaError::ffmpeg_failed("exit 1", Some("Invalid data".into()), Some(1));
        assert_eq!(err.stderr(), Some("Invalid data"));
        assert_eq!(err.to_string(), "FFmpeg failed: exit 1");

        assert_eq!(MediaError::ToolNotFound("ffprobe").stderr(), None);
        assert_eq!(
            MediaError::Timeout(Duration::from_secs(90)).to_string(),
            "FFmpeg killed after 90s"
        );
    }
}
