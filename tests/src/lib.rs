//! Shared test harness for canopy integration tests.
//!
//! Wires a [`TreeChunker`] to a served [`MemStore`] and exposes helpers for
//! the common shapes: split everything into a store, collect the raw chunk
//! set of a split, and build readers over a root.

use std::sync::Arc;

use bytes::Bytes;
use canopy_chunker::{ChunkerConfig, LazyChunkReader, TreeChunker};
use canopy_store::{ChunkStore, MemStore, spawn_store_service};
use canopy_types::{Key, KeySlot, PersistBarrier};
use tokio::sync::mpsc;

/// Channel capacity between chunker and store in tests. Deliberately tiny
/// so back-pressure paths are always exercised.
pub const TEST_CHANNEL_CAPACITY: usize = 2;

/// Install a console tracing subscriber for debugging a failing test.
///
/// Filtered by `RUST_LOG`; calling it more than once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Deterministic pseudo-random test data.
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// A chunker with the given fan-out and default hash and timeouts.
pub fn chunker_with_branches(branches: u64) -> TreeChunker {
    TreeChunker::new(ChunkerConfig::with_branches(branches)).expect("valid test config")
}

/// One split-capable, join-capable pipeline over a single in-memory store.
pub struct TestPipeline {
    pub chunker: TreeChunker,
    pub store: Arc<MemStore>,
    handle: canopy_store::StoreHandle,
}

impl TestPipeline {
    /// Build a pipeline with a fresh store and a served channel pair.
    pub fn new(chunker: TreeChunker) -> Self {
        let store = Arc::new(MemStore::new());
        let handle = spawn_store_service(store.clone(), TEST_CHANNEL_CAPACITY);
        Self {
            chunker,
            store,
            handle,
        }
    }

    /// Split `data` into the store and wait for full durability.
    ///
    /// Panics if the split reports an error.
    pub async fn split(&self, data: Vec<u8>) -> Key {
        let slot = Arc::new(KeySlot::new());
        let barrier = Arc::new(PersistBarrier::new());
        let mut errors = self.chunker.split(
            Arc::clone(&slot),
            data,
            self.handle.chunk_tx.clone(),
            Some(Arc::clone(&barrier)),
        );
        if let Some(e) = errors.recv().await {
            panic!("split failed: {e}");
        }
        barrier.wait().await;
        slot.get().expect("root slot populated").clone()
    }

    /// A lazy reader over `root`, served by this pipeline's store.
    pub fn reader(&self, root: Key) -> LazyChunkReader {
        self.chunker.join(root, self.handle.fetch_tx.clone())
    }

    /// Split then immediately read everything back.
    pub async fn round_trip(&self, data: Vec<u8>) -> (Key, Vec<u8>) {
        let root = self.split(data).await;
        let read = self
            .reader(root.clone())
            .read_to_end()
            .await
            .expect("read back");
        (root, read)
    }
}

/// Run a split without a store, collecting every emitted chunk.
///
/// Returns the root key and the raw `(key, payload, size)` set, for tests
/// that inspect tree structure or seed stores by hand.
pub async fn split_collect(
    chunker: &TreeChunker,
    data: Vec<u8>,
) -> (Key, Vec<(Key, Bytes, u64)>) {
    let slot = Arc::new(KeySlot::new());
    let (chunk_tx, mut chunk_rx) = mpsc::channel(TEST_CHANNEL_CAPACITY);
    let mut errors = chunker.split(Arc::clone(&slot), data, chunk_tx, None);

    let collector = tokio::spawn(async move {
        let mut chunks = Vec::new();
        while let Some(chunk) = chunk_rx.recv().await {
            chunks.push((chunk.key.clone(), chunk.payload.clone(), chunk.size));
        }
        chunks
    });

    if let Some(e) = errors.recv().await {
        panic!("split failed: {e}");
    }
    let chunks = collector.await.expect("collector");
    let root = slot.get().expect("root slot populated").clone();
    (root, chunks)
}

/// Seed a fresh store with a chunk set and serve it.
pub async fn serve_chunks(
    chunks: &[(Key, Bytes, u64)],
) -> (Arc<MemStore>, canopy_store::StoreHandle) {
    let store = Arc::new(MemStore::new());
    for (key, payload, _) in chunks {
        store
            .put(key.clone(), payload.clone())
            .await
            .expect("seed store");
    }
    let handle = spawn_store_service(store.clone(), TEST_CHANNEL_CAPACITY);
    (store, handle)
}
