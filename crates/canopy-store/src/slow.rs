//! A [`ChunkStore`] wrapper that adds configurable random IO latency.
//!
//! `SlowStore` wraps any `Arc<dyn ChunkStore>` and sleeps for a random
//! duration before each read or write. The RNG is seeded so timing-related
//! test failures reproduce across runs.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use canopy_types::Key;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::StoreError;
use crate::traits::ChunkStore;

/// A [`ChunkStore`] wrapper that injects random latency before IO.
///
/// Useful for surfacing ordering bugs in the chunker that an instant
/// in-memory store never exercises: fetches completing out of order,
/// split back-pressure, barrier waits racing the last put.
pub struct SlowStore {
    inner: Arc<dyn ChunkStore>,
    read_latency_ms: (u64, u64),
    write_latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
}

impl SlowStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn ChunkStore>) -> Self {
        Self {
            inner,
            read_latency_ms: (0, 0),
            write_latency_ms: (0, 0),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Set the read latency range in milliseconds (uniform random).
    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.read_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the write latency range in milliseconds (uniform random).
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.write_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the RNG seed for reproducible delays.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    async fn delay(&self, range: (u64, u64)) {
        let (min, max) = range;
        if max == 0 {
            return;
        }
        let ms = if min == max {
            min
        } else {
            self.rng.lock().expect("lock poisoned").random_range(min..=max)
        };
        if ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl ChunkStore for SlowStore {
    async fn put(&self, key: Key, payload: Bytes) -> Result<(), StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.put(key, payload).await
    }

    async fn get(&self, key: &Key) -> Result<Option<Bytes>, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.get(key).await
    }

    async fn contains(&self, key: &Key) -> Result<bool, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.contains(key).await
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.delete(key).await
    }

    async fn list(&self) -> Result<Vec<Key>, StoreError> {
        self.inner.list().await
    }

    async fn verify(&self, key: &Key) -> Result<bool, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.verify(key).await
    }
}
