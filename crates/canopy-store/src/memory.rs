//! In-memory chunk storage backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use bytes::Bytes;
use canopy_types::{HashScheme, Key, Sha256Scheme};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// In-memory chunk store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for nodes serving content entirely from memory.
/// Holds the hash scheme of the trees it stores so `verify` can re-derive
/// keys from payloads.
pub struct MemStore {
    chunks: RwLock<HashMap<Key, Bytes>>,
    scheme: Arc<dyn HashScheme>,
}

impl MemStore {
    /// Create an empty store verifying against SHA-256 keys.
    pub fn new() -> Self {
        Self::with_scheme(Arc::new(Sha256Scheme))
    }

    /// Create an empty store verifying against the given scheme.
    pub fn with_scheme(scheme: Arc<dyn HashScheme>) -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            scheme,
        }
    }

    /// Number of distinct chunks held.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChunkStore for MemStore {
    async fn put(&self, key: Key, payload: Bytes) -> Result<(), StoreError> {
        let mut map = self.chunks.write().expect("lock poisoned");
        // Content-addressed: an existing key already holds these bytes.
        if map.contains_key(&key) {
            debug!(%key, "chunk already present, deduplicated");
            return Ok(());
        }
        debug!(%key, len = payload.len(), "storing chunk");
        map.insert(key, payload);
        Ok(())
    }

    async fn get(&self, key: &Key) -> Result<Option<Bytes>, StoreError> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn contains(&self, key: &Key) -> Result<bool, StoreError> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        let mut map = self.chunks.write().expect("lock poisoned");
        if map.remove(key).is_some() {
            debug!(%key, "deleted chunk");
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Key>, StoreError> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }

    async fn verify(&self, key: &Key) -> Result<bool, StoreError> {
        let map = self.chunks.read().expect("lock poisoned");
        match map.get(key) {
            Some(payload) => Ok(&self.scheme.digest(payload) == key),
            None => Err(StoreError::NotFound(key.clone())),
        }
    }
}
