//! Stream-copy concatenation of normalized clips.

use std::path::{Path, PathBuf};

use metrics::histogram;
use tracing::info;

use crate::clip::NormalizedClip;
use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Render the concat-demuxer manifest for `paths`, in order.
///
/// Each path is single-quoted; an embedded quote becomes `'\''`.
pub fn render_manifest<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut manifest = String::from("ffconcat version 1.0\n");
    for path in paths {
        let escaped = path.as_ref().to_string_lossy().replace('\'', r"'\''");
        manifest.push_str(&format!("file '{}'\n", escaped));
    }
    manifest
}

/// Build the concatenation command.
///
/// `+genpts` regenerates presentation timestamps across the join points and
/// `make_zero` shifts any negative start so playback time is continuous.
pub fn build_concat_command(manifest: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(
            FfmpegInput::concat_manifest(manifest)
                .arg("-fflags")
                .arg("+genpts"),
        )
        .map("0")
        .stream_copy()
        .output_args(["-avoid_negative_ts", "make_zero", "-movflags", "+faststart"])
}

/// Joins normalized clips without re-encoding.
#[derive(Debug, Clone, Default)]
pub struct Concatenator {
    runner: FfmpegRunner,
}

impl Concatenator {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Write the manifest to `manifest` and concatenate `clips` into `output`.
    pub async fn concatenate(
        &self,
        clips: &[NormalizedClip],
        manifest: &Path,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        if clips.is_empty() {
            return Err(MediaError::invalid_input("no clips to concatenate"));
        }

        let paths: Vec<&Path> = clips.iter().map(|c| c.path.as_path()).collect();
        tokio::fs::write(manifest, render_manifest(&paths)).await?;

        let result = self.runner.run(&build_concat_command(manifest, output)).await?;
        histogram!("vgb_concat_duration_seconds").record(result.elapsed.as_secs_f64());
        info!(
            clips = clips.len(),
            output = %output.display(),
            duration_ms = result.elapsed.as_millis() as u64,
            "Concatenated clips"
        );

        Ok(output.to_path_buf())
    }
}
