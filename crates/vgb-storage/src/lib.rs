//! Object storage for guest media and compiled videos.
//!
//! The compiler only needs four capabilities from storage: fetch bytes by
//! key, store bytes at a key, delete a key and produce a time-limited URL.
//! They are expressed by the [`ObjectStore`] trait, implemented for the
//! S3-compatible [`R2Client`] and for an in-memory store.

pub mod client;
pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryObjectStore;
pub use store::ObjectStore;
