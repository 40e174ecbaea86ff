//! Shared data models for the guestbook compiler.
//!
//! This crate provides Serde-serializable types for:
//! - Events and guest messages read from the metadata store
//! - Compilation job status exposed to polling clients
//! - Webhook payloads
//! - The canonical output profile every normalized clip is encoded with

pub mod compilation;
pub mod event;
pub mod profile;
pub mod webhook;

pub use compilation::{CompilationJob, CompilationStatus};
pub use event::{Event, EventId, MediaKind, Message, ParseMediaKindError};
pub use profile::OutputProfile;
pub use webhook::{validate_webhook_url, WebhookPayload, WebhookUrlError};
