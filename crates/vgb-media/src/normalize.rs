//! Clip normalization.
//!
//! Turns a guest recording of any format into a segment of the canonical
//! [`OutputProfile`] with the guest name burned in. Video and audio clips go
//! through different filter graphs but share the same encoder arguments, so
//! every segment can be concatenated with stream copy.

use std::path::Path;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, warn};
use vgb_models::{MediaKind, OutputProfile};

use crate::black_detect::TimingAnalyzer;
use crate::clip::{MediaClip, NormalizedClip};
use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::MediaResult;
use crate::overlay::{build_drawtext_filter, sanitize_display_name, text_file_for, OverlayStyle};
use crate::probe::probe_media;

/// Leading trim applied to audio clips.
pub const AUDIO_TRIM_SECS: f64 = 0.1;
/// Background behind the waveform of audio clips.
pub const WAVEFORM_BACKGROUND: &str = "0x1e1b4b";
pub const WAVEFORM_COLOR: &str = "0xffffff";

/// Converts clips to the canonical profile.
#[derive(Debug, Clone, Default)]
pub struct ClipNormalizer {
    runner: FfmpegRunner,
    analyzer: TimingAnalyzer,
    profile: OutputProfile,
    style: OverlayStyle,
}

impl ClipNormalizer {
    pub fn new(runner: FfmpegRunner, profile: OutputProfile, style: OverlayStyle) -> Self {
        Self {
            analyzer: TimingAnalyzer::new(runner.clone()),
            runner,
            profile,
            style,
        }
    }

    pub fn profile(&self) -> &OutputProfile {
        &self.profile
    }

    /// Normalize `clip` into `output`.
    pub async fn normalize(&self, clip: &MediaClip, output: &Path) -> MediaResult<NormalizedClip> {
        let start = Instant::now();
        let text_file = text_file_for(output);
        tokio::fs::write(&text_file, sanitize_display_name(&clip.guest_name)).await?;

        let cmd = match clip.kind {
            MediaKind::Video => {
                let trim_start = self.analyzer.trim_start(&clip.path).await;
                let info = probe_media(&clip.path).await?;
                if !info.has_audio {
                    debug!(message_id = %clip.message_id, "Video clip has no audio, adding silence");
                }
                self.video_command(&clip.path, trim_start, info.has_audio, &text_file, output)
            }
            MediaKind::Audio => self.audio_command(&clip.path, &text_file, output),
        };

        let result = self.runner.run(&cmd).await;

        if let Err(e) = tokio::fs::remove_file(&text_file).await {
            warn!(path = %text_file.display(), error = %e, "Failed to remove overlay text file");
        }
        if let Err(e) = result {
            warn!(
                message_id = %clip.message_id,
                stderr = e.stderr().unwrap_or_default(),
                "Normalization failed"
            );
            return Err(e);
        }

        let elapsed = start.elapsed();
        counter!("vgb_clips_normalized_total", "kind" => clip.kind.as_str()).increment(1);
        histogram!("vgb_clip_normalize_duration_seconds", "kind" => clip.kind.as_str())
            .record(elapsed.as_secs_f64());
        info!(
            message_id = %clip.message_id,
            kind = %clip.kind,
            duration_ms = elapsed.as_millis() as u64,
            "Normalized clip"
        );

        Ok(NormalizedClip {
            message_id: clip.message_id.clone(),
            path: output.to_path_buf(),
        })
    }

    /// Command for a video clip starting at `trim_start`.
    pub fn video_command(
        &self,
        input: &Path,
        trim_start: f64,
        has_audio: bool,
        text_file: &Path,
        output: &Path,
    ) -> FfmpegCommand {
        let p = &self.profile;
        let video_chain = format!(
            "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps={fps},\
             format={pix},setpts=PTS-STARTPTS,{overlay}[v]",
            w = p.width,
            h = p.height,
            fps = p.fps,
            pix = p.pixel_format,
            overlay = build_drawtext_filter(text_file, &self.style),
        );

        let cmd = FfmpegCommand::new(output).input(FfmpegInput::file(input).seek(trim_start));

        let cmd = if has_audio {
            cmd.filter_complex(format!("{};[0:a]{}[a]", video_chain, self.audio_chain()))
                .map("[v]")
                .map("[a]")
        } else {
            cmd.input(FfmpegInput::lavfi(self.silence_source()))
                .filter_complex(video_chain)
                .map("[v]")
                .map("1:a")
                .shortest()
        };

        cmd.output_args(p.to_ffmpeg_args())
    }

    /// Command for an audio clip: waveform over a flat background.
    pub fn audio_command(&self, input: &Path, text_file: &Path, output: &Path) -> FfmpegCommand {
        let p = &self.profile;
        let graph = format!(
            "[0:a]{audio},asplit=2[a][aw];\
             [aw]showwaves=s={w}x{wave_h}:mode=cline:rate={fps}:colors={wave_color}[wave];\
             [1:v][wave]overlay=(W-w)/2:(H-h)/2:shortest=1,setsar=1,format={pix},{overlay}[v]",
            audio = self.audio_chain(),
            w = p.width,
            wave_h = p.height / 3,
            fps = p.fps,
            wave_color = WAVEFORM_COLOR,
            pix = p.pixel_format,
            overlay = build_drawtext_filter(text_file, &self.style),
        );

        FfmpegCommand::new(output)
            .input(FfmpegInput::file(input).seek(AUDIO_TRIM_SECS))
            .input(FfmpegInput::lavfi(format!(
                "color=c={}:s={}:r={}",
                WAVEFORM_BACKGROUND,
                p.size(),
                p.fps
            )))
            .filter_complex(graph)
            .map("[v]")
            .map("[a]")
            .shortest()
            .output_args(p.to_ffmpeg_args())
    }

    fn audio_chain(&self) -> String {
        format!(
            "aresample={rate}:async=1,aformat=sample_fmts=fltp:channel_layouts={layout},\
             asetpts=PTS-STARTPTS",
            rate = self.profile.sample_rate,
            layout = channel_layout(self.profile.audio_channels),
        )
    }

    fn silence_source(&self) -> String {
        format!(
            "anullsrc=r={}:cl={}",
            self.profile.sample_rate,
            channel_layout(self.profile.audio_channels)
        )
    }
}

fn channel_layout(channels: u8) -> &'static str {
    if channels == 1 {
        "mono"
    } else {
        "stereo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn normalizer() -> ClipNormalizer {
        ClipNormalizer::default()
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let i = args.iter().position(|a| a == flag).unwrap();
        &args[i + 1]
    }

    /// Arguments following the filter graph and stream maps.
    fn encoder_args(args: &[String]) -> Vec<String> {
        let i = args.iter().position(|a| a == "-c:v").unwrap();
        args[i..args.len() - 1].to_vec()
    }

    #[test]
    fn test_video_command_trims_and_overlays() {
        let cmd = normalizer().video_command(
            Path::new("/w/in.webm"),
            1.283,
            true,
            Path::new("/w/n0.name.txt"),
            Path::new("/w/n0.mp4"),
        );
        let args = cmd.build_args();

        assert_eq!(arg_after(&args, "-ss"), "1.283");
        let graph = arg_after(&args, "-filter_complex");
        assert!(graph.starts_with("[0:v]scale=1280:720:force_original_aspect_ratio=decrease"));
        assert!(graph.contains("fps=30"));
        assert!(graph.contains("drawtext="));
        assert!(graph.contains("textfile=/w/n0.name.txt"));
        assert!(graph.ends_with("asetpts=PTS-STARTPTS[a]"));
        assert_eq!(args.last().unwrap(), "/w/n0.mp4");
    }

    #[test]
    fn test_silent_video_gets_silence_track() {
        let cmd = normalizer().video_command(
            Path::new("/w/in.webm"),
            0.2,
            false,
            Path::new("/w/n0.name.txt"),
            Path::new("/w/n0.mp4"),
        );
        let args = cmd.build_args();
        let joined = args.join(" ");

        assert!(joined.contains("-f lavfi -i anullsrc=r=48000:cl=stereo"));
        assert!(joined.contains("-map 1:a"));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(!arg_after(&args, "-filter_complex").contains("[0:a]"));
    }

    #[test]
    fn test_audio_command_builds_waveform() {
        let cmd = normalizer().audio_command(
            Path::new("/w/in.mp3"),
            Path::new("/w/n1.name.txt"),
            Path::new("/w/n1.mp4"),
        );
        let args = cmd.build_args();
        let joined = args.join(" ");

        assert_eq!(arg_after(&args, "-ss"), "0.100");
        assert!(joined.contains("-f lavfi -i color=c=0x1e1b4b:s=1280x720:r=30"));
        let graph = arg_after(&args, "-filter_complex");
        assert!(graph.contains("showwaves=s=1280x240:mode=cline"));
        assert!(graph.contains("[1:v][wave]overlay="));
        assert!(graph.contains("textfile=/w/n1.name.txt"));
    }

    #[test]
    fn test_video_and_audio_share_encoder_settings() {
        let n = normalizer();
        let text = PathBuf::from("/w/t.txt");
        let video = n
            .video_command(Path::new("/w/a.webm"), 0.2, true, &text, Path::new("/w/a.mp4"))
            .build_args();
        let silent = n
            .video_command(Path::new("/w/c.webm"), 0.2, false, &text, Path::new("/w/c.mp4"))
            .build_args();
        let audio = n
            .audio_command(Path::new("/w/b.mp3"), &text, Path::new("/w/b.mp4"))
            .build_args();

        let expected = OutputProfile::default().to_ffmpeg_args();
        assert_eq!(encoder_args(&video), expected);
        assert_eq!(encoder_args(&silent), expected);
        assert_eq!(encoder_args(&audio), expected);
    }

    #[tokio::test]
    async fn test_normalize_cleans_text_file_on_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.mp3");
        tokio::fs::write(&input, b"not really audio").await.unwrap();
        let output = dir.path().join("out.mp4");

        let n = ClipNormalizer::new(
            FfmpegRunner::new().with_binary("/nonexistent/ffmpeg-binary"),
            OutputProfile::default(),
            OverlayStyle::default(),
        );
        let clip = MediaClip::new("m1", &input, "Ann", MediaKind::Audio);

        assert!(n.normalize(&clip, &output).await.is_err());
        assert!(!text_file_for(&output).exists());
    }
}
