//! Guestbook compilation API server.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vgb_api::{create_router, metrics, shutdown_signal, ApiConfig, AppState};

/// `LOG_FORMAT=json` for machine-readable logs, `RUST_LOG` for filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(false)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn metrics_enabled() -> bool {
    std::env::var("METRICS_ENABLED").map_or(true, |v| matches!(v.as_str(), "true" | "1"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // reqwest and the AWS SDK both need a process-wide provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("rustls crypto provider already installed");

    init_tracing();

    let config = ApiConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        idle_shutdown_secs = config.idle_shutdown.map(|d| d.as_secs()),
        "Starting guestbook compiler API"
    );

    let state = AppState::new(config.clone())
        .await
        .map_err(|e| anyhow::anyhow!("startup failed: {}", e))?;

    let metrics_handle = metrics_enabled().then(metrics::init_metrics);

    let shutdown = state.shutdown.clone();
    let _idle_watch = shutdown.spawn_idle_watch();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!(%addr, metrics = metrics_handle.is_some(), "Listening");

    let app = create_router(state, metrics_handle);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("server error")?;

    let remaining = shutdown.drain(config.shutdown_grace).await;
    if remaining > 0 {
        warn!(remaining, "Exiting with compilations still in flight");
    } else {
        info!("Shutdown complete");
    }
    Ok(())
}
