//! Compiler configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Compiler configuration.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Root of per-job scratch directories
    pub work_dir: PathBuf,
    /// Lifetime of signed output URLs
    pub output_url_ttl: Duration,
    /// Limit for each phase (fetch, each normalization, concat, publish).
    /// `None` runs phases without a limit.
    pub phase_timeout: Option<Duration>,
    /// Concurrent transcodes per job; 1 normalizes clips one at a time
    pub normalize_concurrency: usize,
    pub webhook_timeout: Duration,
    /// HMAC key for webhook signatures
    pub webhook_secret: Option<String>,
    /// How long finished statuses stay pollable; `None` keeps them forever
    pub status_retention: Option<Duration>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/vgb"),
            output_url_ttl: Duration::from_secs(7 * 24 * 3600), // 7 days
            phase_timeout: None,
            normalize_concurrency: 1,
            webhook_timeout: Duration::from_secs(10),
            webhook_secret: None,
            status_retention: Some(Duration::from_secs(24 * 3600)),
        }
    }
}

impl CompilerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str| -> Option<u64> {
            std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
        };

        Self {
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_url_ttl: secs("OUTPUT_URL_TTL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.output_url_ttl),
            phase_timeout: secs("PHASE_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            normalize_concurrency: std::env::var("NORMALIZE_CONCURRENCY")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.normalize_concurrency),
            webhook_timeout: secs("WEBHOOK_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.webhook_timeout),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            status_retention: match secs("STATUS_RETENTION_SECS") {
                Some(0) => None,
                Some(s) => Some(Duration::from_secs(s)),
                None => defaults.status_retention,
            },
        }
    }
}
