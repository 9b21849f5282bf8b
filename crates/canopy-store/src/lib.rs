//! Chunk storage for the canopy chunker.
//!
//! This crate defines the [`ChunkStore`] trait for persisting
//! content-addressed chunks, two backends, and the channel service that
//! connects any backend to the chunker:
//!
//! - [`MemStore`] — in-memory storage backed by a `RwLock<HashMap>`.
//! - [`SlowStore`] — latency-injecting wrapper for timing tests.
//! - [`spawn_store_service`] — drains a chunk channel (write side) and a
//!   fetch channel (read side) into a backend.

mod error;
mod memory;
mod service;
mod slow;
mod traits;

pub use error::StoreError;
pub use memory::MemStore;
pub use service::{StoreHandle, spawn_store_service};
pub use slow::SlowStore;
pub use traits::ChunkStore;
