//! FFprobe stream information.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Streams present in a media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Duration in seconds, when the container reports one
    pub duration: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json: &str) -> MediaResult<MediaInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)?;

    Ok(MediaInfo {
        duration: output
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite()),
        has_video: output.streams.iter().any(|s| s.codec_type == "video"),
        has_audio: output.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

/// Probe a media file for its streams.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::ToolNotFound("ffprobe"))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {}", output.status),
            stderr: Some(stderr),
        });
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_with_audio() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "vp8"},
                {"index": 1, "codec_type": "audio", "codec_name": "opus"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.duration, Some(12.48));
    }

    #[test]
    fn test_parse_silent_video_without_duration() {
        let json = r#"{"streams": [{"codec_type": "video"}], "format": {"duration": "N/A"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.has_video);
        assert!(!info.has_audio);
        assert_eq!(info.duration, None);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_probe_output("not json"),
            Err(MediaError::ProbeOutput(_))
        ));
    }
}
