//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Compile trigger requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Shut down after this long without a compile trigger. `None` disables.
    pub idle_shutdown: Option<Duration>,
    /// How long shutdown waits for in-flight compilations
    pub shutdown_grace: Duration,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 5,
            rate_limit_burst: 10,
            max_body_size: 64 * 1024,
            idle_shutdown: None,
            shutdown_grace: Duration::from_secs(300),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parse_env("PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: parse_env("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: parse_env("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            max_body_size: parse_env("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            idle_shutdown: parse_env::<u64>("IDLE_SHUTDOWN_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs),
            shutdown_grace: parse_env("SHUTDOWN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "CORS_ORIGINS",
        "RATE_LIMIT_RPS",
        "RATE_LIMIT_BURST",
        "MAX_BODY_SIZE",
        "IDLE_SHUTDOWN_SECS",
        "SHUTDOWN_GRACE_SECS",
        "ENVIRONMENT",
    ];

    fn clear() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = ApiConfig::from_env();
        assert_eq!(config.port, 8000);
        assert_eq!(config.rate_limit_rps, 5);
        assert_eq!(config.max_body_size, 64 * 1024);
        assert_eq!(config.idle_shutdown, None);
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(!config.is_production());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear();
        std::env::set_var("PORT", "9100");
        std::env::set_var("CORS_ORIGINS", "https://a.example, https://b.example,");
        std::env::set_var("IDLE_SHUTDOWN_SECS", "900");
        std::env::set_var("ENVIRONMENT", "Production");

        let config = ApiConfig::from_env();
        assert_eq!(config.port, 9100);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.idle_shutdown, Some(Duration::from_secs(900)));
        assert!(config.is_production());
        clear();
    }

    #[test]
    #[serial]
    fn test_zero_idle_timeout_disables_shutdown() {
        clear();
        std::env::set_var("IDLE_SHUTDOWN_SECS", "0");
        assert_eq!(ApiConfig::from_env().idle_shutdown, None);
        clear();
    }
}
