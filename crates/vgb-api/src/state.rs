//! Application state.

use std::sync::Arc;

use tracing::{info, warn};
use vgb_compiler::{
    CompilationOrchestrator, CompilerConfig, EventLocks, FfmpegPipeline, StatusRegistry,
};
use vgb_firestore::FirestoreMetadataStore;
use vgb_media::check_ffmpeg;
use vgb_storage::R2Client;

use crate::config::ApiConfig;
use crate::shutdown::ShutdownCoordinator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<CompilationOrchestrator>,
    pub shutdown: ShutdownCoordinator,
    /// FFmpeg was found on PATH at startup.
    pub ffmpeg_ready: bool,
}

impl AppState {
    /// Create application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let compiler_config = CompilerConfig::from_env();
        let store = Arc::new(R2Client::from_env()?);
        let metadata = Arc::new(FirestoreMetadataStore::from_env().await?);

        let ffmpeg_ready = match check_ffmpeg() {
            Ok(path) => {
                info!(path = %path.display(), "FFmpeg found");
                true
            }
            Err(e) => {
                warn!(error = %e, "FFmpeg unavailable, compilations will fail");
                false
            }
        };

        let registry = match compiler_config.status_retention {
            Some(retention) => StatusRegistry::with_retention(retention),
            None => StatusRegistry::new(),
        };
        let orchestrator = CompilationOrchestrator::new(
            compiler_config,
            metadata,
            store,
            Arc::new(FfmpegPipeline::default()),
            registry,
            EventLocks::new(),
        )?;

        Ok(Self::from_parts(config, Arc::new(orchestrator), ffmpeg_ready))
    }

    /// Assemble state around an existing orchestrator.
    pub fn from_parts(
        config: ApiConfig,
        orchestrator: Arc<CompilationOrchestrator>,
        ffmpeg_ready: bool,
    ) -> Self {
        let shutdown =
            ShutdownCoordinator::new(config.idle_shutdown, orchestrator.locks().clone());
        Self {
            config,
            orchestrator,
            shutdown,
            ffmpeg_ready,
        }
    }
}
