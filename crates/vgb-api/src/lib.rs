//! Axum HTTP API for guestbook compilation.
//!
//! Routes:
//! - `POST /compile/{eventId}` starts a background compilation (202)
//! - `GET /status/{eventId}` polls its status
//! - `GET|DELETE /output/{eventId}` reads or removes the compiled video
//! - `GET /health`, `GET /ready`, `GET /metrics`

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use shutdown::{decide, shutdown_signal, ShutdownCoordinator, ShutdownDecision};
pub use state::AppState;
