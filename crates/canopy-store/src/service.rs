//! Channel-facing store service.
//!
//! The chunker talks to storage through exactly two channels: a chunk
//! channel it sends completed chunks on during a split, and a fetch channel
//! it sends retrieval requests on during a join. This module drains both
//! into a [`ChunkStore`] backend, making any backend a drop-in storage
//! peer for the chunker.

use std::sync::Arc;

use canopy_types::{Chunk, FetchRequest};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::traits::ChunkStore;

/// Sender halves of a running store service.
///
/// Hand `chunk_tx` to `split` and `fetch_tx` to `join`. The service tasks
/// exit once every clone of the corresponding sender has been dropped.
pub struct StoreHandle {
    /// Write side: completed chunks from a split.
    pub chunk_tx: mpsc::Sender<Chunk>,
    /// Read side: fetch requests from a lazy reader.
    pub fetch_tx: mpsc::Sender<FetchRequest>,
}

/// Spawn the two service loops for `store` and return their senders.
///
/// `capacity` bounds both channels and is the only buffering between the
/// chunker and the backend; keep it small so a slow store back-pressures
/// the splitter instead of ballooning memory.
pub fn spawn_store_service(store: Arc<dyn ChunkStore>, capacity: usize) -> StoreHandle {
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity);
    let (fetch_tx, fetch_rx) = mpsc::channel(capacity);

    tokio::spawn(serve_writes(Arc::clone(&store), chunk_rx));
    tokio::spawn(serve_fetches(store, fetch_rx));

    StoreHandle { chunk_tx, fetch_tx }
}

/// Persist every incoming chunk, releasing its persistence guard after the
/// backend accepts it.
///
/// A failed put is logged and the guard released regardless: barrier
/// waiters observe that every chunk was handled, and the corresponding key
/// will surface as not-found on the read path.
async fn serve_writes(store: Arc<dyn ChunkStore>, mut chunks: mpsc::Receiver<Chunk>) {
    while let Some(mut chunk) = chunks.recv().await {
        match store.put(chunk.key.clone(), chunk.payload.clone()).await {
            Ok(()) => chunk.mark_persisted(),
            Err(e) => warn!(key = %chunk.key, error = %e, "failed to persist chunk"),
        }
    }
    debug!("chunk channel closed, write side done");
}

/// Answer every fetch request with the stored payload, or with the empty
/// not-found payload.
async fn serve_fetches(store: Arc<dyn ChunkStore>, mut fetches: mpsc::Receiver<FetchRequest>) {
    while let Some(request) = fetches.recv().await {
        match store.get(request.key()).await {
            Ok(Some(payload)) => request.deliver(payload),
            Ok(None) => {
                debug!(key = %request.key(), "fetch miss");
                request.not_found();
            }
            Err(e) => {
                warn!(key = %request.key(), error = %e, "fetch failed");
                request.not_found();
            }
        }
    }
    debug!("fetch channel closed, read side done");
}
