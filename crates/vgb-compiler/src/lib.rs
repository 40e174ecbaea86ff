//! Guestbook compilation.
//!
//! Drives one event's compilation end to end: guard the event, fetch the
//! guest clips, normalize them, concatenate, publish, record the output key,
//! notify and clean up. Status is kept in an in-memory [`StatusRegistry`]
//! for polling clients; [`EventLocks`] keeps one compilation per event.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod locks;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod scratch;
pub mod webhook;

pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult, ErrorKind};
pub use fetcher::MediaFetcher;
pub use locks::{EventLease, EventLocks};
pub use logging::JobLogger;
pub use orchestrator::{CompilationOrchestrator, CompiledOutput};
pub use pipeline::{FfmpegPipeline, MediaPipeline};
pub use publisher::{PublishedOutput, Publisher};
pub use registry::StatusRegistry;
pub use scratch::ScratchSpace;
pub use webhook::WebhookNotifier;
