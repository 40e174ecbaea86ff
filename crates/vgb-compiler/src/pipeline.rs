//! Media processing seam between the orchestrator and FFmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vgb_media::{ClipNormalizer, Concatenator, FfmpegRunner, MediaClip, MediaResult, NormalizedClip};
use vgb_media::OverlayStyle;
use vgb_models::OutputProfile;

/// Normalization and concatenation as the orchestrator uses them.
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Convert one clip to the canonical profile at `output`.
    async fn normalize(&self, clip: &MediaClip, output: &Path) -> MediaResult<NormalizedClip>;

    /// Join `clips` in order into `output`, writing the manifest to `manifest`.
    async fn concatenate(
        &self,
        clips: &[NormalizedClip],
        manifest: &Path,
        output: &Path,
    ) -> MediaResult<PathBuf>;
}

/// [`MediaPipeline`] running FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegPipeline {
    normalizer: ClipNormalizer,
    concatenator: Concatenator,
}

impl FfmpegPipeline {
    pub fn new(runner: FfmpegRunner, profile: OutputProfile, style: OverlayStyle) -> Self {
        Self {
            normalizer: ClipNormalizer::new(runner.clone(), profile, style),
            concatenator: Concatenator::new(runner),
        }
    }
}

#[async_trait]
impl MediaPipeline for FfmpegPipeline {
    async fn normalize(&self, clip: &MediaClip, output: &Path) -> MediaResult<NormalizedClip> {
        self.normalizer.normalize(clip, output).await
    }

    async fn concatenate(
        &self,
        clips: &[NormalizedClip],
        manifest: &Path,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        self.concatenator.concatenate(clips, manifest, output).await
    }
}
