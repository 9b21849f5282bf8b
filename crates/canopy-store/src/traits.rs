//! Core trait for chunk storage backends.

use bytes::Bytes;
use canopy_types::Key;

use crate::error::StoreError;

/// Trait for storing and retrieving content-addressed chunks by key.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Payloads are passed as [`Bytes`] so clones through channels stay cheap.
///
/// Because chunks are content-addressed, `put` is idempotent: a key that is
/// already present maps to identical bytes, and backends may treat the
/// second write as a no-op. This is the natural deduplication the chunker
/// relies on when it emits identical subtrees more than once.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store a chunk payload under its key.
    async fn put(&self, key: Key, payload: Bytes) -> Result<(), StoreError>;

    /// Retrieve a chunk payload by key. Returns `None` if not found.
    async fn get(&self, key: &Key) -> Result<Option<Bytes>, StoreError>;

    /// Check whether a key is present.
    async fn contains(&self, key: &Key) -> Result<bool, StoreError>;

    /// Delete a chunk by key. Deleting an absent key is not an error.
    async fn delete(&self, key: &Key) -> Result<(), StoreError>;

    /// List all stored keys.
    async fn list(&self) -> Result<Vec<Key>, StoreError>;

    /// Verify chunk integrity by re-hashing the payload against its key.
    async fn verify(&self, key: &Key) -> Result<bool, StoreError>;
}
