//! FFmpeg command builder and runner.
//!
//! Commands are plain data: `build_args()` produces the argument vector and
//! nothing is ever passed through a shell. `FfmpegRunner` is the only place
//! that spawns a process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Number of trailing stderr lines kept on failure.
const STDERR_TAIL_LINES: usize = 20;

/// One `-i` input together with the options that apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
    /// Options placed before `-i`
    args: Vec<String>,
    /// File path or lavfi graph
    source: String,
}

impl FfmpegInput {
    /// A regular file input.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            args: Vec::new(),
            source: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// A synthetic lavfi source such as `color=c=black:s=1280x720`.
    pub fn lavfi(graph: impl Into<String>) -> Self {
        Self {
            args: vec!["-f".into(), "lavfi".into()],
            source: graph.into(),
        }
    }

    /// A concat-demuxer manifest.
    pub fn concat_manifest(path: impl AsRef<Path>) -> Self {
        Self {
            args: vec!["-f".into(), "concat".into(), "-safe".into(), "0".into()],
            source: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Add an option before `-i`.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Input seek in seconds.
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    /// Output path, or `-` for the null muxer
    output: String,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_string_lossy().to_string(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create a command whose output goes to stdout.
    ///
    /// Combined with `.format("null")` for analysis filters that report
    /// through the log.
    pub fn null_output() -> Self {
        Self::new("-")
    }

    /// Append an input.
    pub fn input(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Copy all streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Drop audio from the output.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Force the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Stop at the end of the shortest stream.
    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn inputs(&self) -> &[FfmpegInput] {
        &self.inputs
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.clone());

        args
    }
}

/// Captured result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct FfmpegOutput {
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runner for FFmpeg commands with optional timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner using `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            timeout_secs: None,
        }
    }

    /// Use a specific FFmpeg binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Kill the process after `secs` seconds. 0 disables the timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = (secs > 0).then_some(secs);
        self
    }

    /// Run an FFmpeg command, capturing stderr.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<FfmpegOutput> {
        which::which(&self.binary).map_err(|_| MediaError::ToolNotFound("ffmpeg"))?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let start = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;

        let collect_stderr = async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        };

        let run = async { tokio::join!(child.wait(), collect_stderr) };

        let finished = match self.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run).await.ok(),
            None => Some(run.await),
        };

        let Some((status, stderr)) = finished else {
            let secs = self.timeout_secs.unwrap_or_default();
            warn!("FFmpeg timed out after {} seconds, killing process", secs);
            let _ = child.kill().await;
            return Err(MediaError::Timeout(Duration::from_secs(secs)));
        };

        let status = status?;
        if status.success() {
            Ok(FfmpegOutput {
                stderr,
                elapsed: start.elapsed(),
            })
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with {}: {}", status, last_line(&stderr)),
                Some(stderr_tail(&stderr)),
                status.code(),
            ))
        }
    }
}

fn last_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
        .trim()
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg"))
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::ToolNotFound("ffprobe"))
}
