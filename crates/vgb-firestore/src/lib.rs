//! Firestore REST API client and metadata store.
//!
//! This crate provides:
//! - The [`MetadataStore`] capability the compiler reads events and messages through
//! - Typed repositories for events and guest messages
//! - Service account authentication via gcp_auth, or a static token for the emulator
//! - Retry with backoff and request metrics

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::InMemoryMetadataStore;
pub use repos::{EventRepository, MessageRepository};
pub use store::{EventUpdate, FirestoreMetadataStore, MetadataStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
