//! Tree chunker: disassembles a byte stream into a content-addressed
//! Merkle tree of chunks.
//!
//! Each node of the tree is stored as one chunk. Branch payloads carry the
//! subtree size and the keys of their children; leaf payloads carry the
//! subtree size and a raw data slice. The key of the root chunk addresses
//! the entire content.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use canopy_types::{
    Chunk, FetchRequest, HashScheme, Key, KeySlot, PersistBarrier, SIZE_PREFIX_LEN,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::config::ChunkerConfig;
use crate::error::{ConfigError, SplitError};
use crate::reader::LazyChunkReader;
use crate::source::DataSource;

/// Splits data into a balanced tree of content-addressed chunks and
/// reassembles it lazily from a root key.
///
/// The chunker owns no storage; it talks to a chunk store exclusively
/// through channels. See [`split`](Self::split) and [`join`](Self::join).
#[derive(Clone)]
pub struct TreeChunker {
    pub(crate) hash: Arc<dyn HashScheme>,
    pub(crate) branches: u64,
    pub(crate) hash_size: usize,
    pub(crate) chunk_size: u64,
    split_timeout: Duration,
    pub(crate) join_timeout: Duration,
}

impl TreeChunker {
    /// Build a chunker from a config with a built-in hash algorithm.
    pub fn new(config: ChunkerConfig) -> Result<Self, ConfigError> {
        let scheme = config.hash.scheme();
        Self::with_scheme(scheme, config)
    }

    /// Build a chunker around a caller-provided hash scheme.
    ///
    /// Rejects fan-outs below 2 (a degenerate linear chain) and zero-width
    /// hash outputs.
    pub fn with_scheme(
        scheme: Arc<dyn HashScheme>,
        config: ChunkerConfig,
    ) -> Result<Self, ConfigError> {
        if config.branches < 2 {
            return Err(ConfigError::BranchesTooSmall {
                branches: config.branches,
            });
        }
        let hash_size = scheme.output_size();
        if hash_size == 0 {
            return Err(ConfigError::EmptyHash);
        }
        Ok(Self {
            branches: config.branches,
            hash_size,
            chunk_size: hash_size as u64 * config.branches,
            hash: scheme,
            split_timeout: config.split_timeout,
            join_timeout: config.join_timeout,
        })
    }

    /// Key (hash output) width in bytes.
    pub fn key_size(&self) -> usize {
        self.hash_size
    }

    /// Maximum leaf body length: `key_size * branches`.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Maximum tree fan-out.
    pub fn branches(&self) -> u64 {
        self.branches
    }

    /// Split `source` into a tree of chunks.
    ///
    /// Chunks are sent on `chunk_tx` bottom-up in no particular order; the
    /// store is expected to deduplicate by key. When a `barrier` is given,
    /// every chunk registers with it before being sent, so the caller can
    /// wait on durability separately from structural completion.
    ///
    /// The returned error channel carries at most one error and then
    /// closes. A close without a value signals success, at which point
    /// `slot` holds the root key.
    pub fn split<S: DataSource>(
        &self,
        slot: Arc<KeySlot>,
        source: S,
        chunk_tx: mpsc::Sender<Chunk>,
        barrier: Option<Arc<PersistBarrier>>,
    ) -> mpsc::Receiver<SplitError> {
        let (err_tx, err_rx) = mpsc::channel(1);
        let chunker = self.clone();
        let data: Arc<dyn DataSource> = Arc::new(source);

        tokio::spawn(async move {
            let size = data.size();
            let (depth, tree_size) = chunker.tree_depth(size);
            debug!(size, depth, chunk_size = chunker.chunk_size, "split started");

            let outcome = tokio::time::timeout(
                chunker.split_timeout,
                split_range(
                    chunker.clone(),
                    depth,
                    tree_size / chunker.branches,
                    data,
                    0,
                    size,
                    chunk_tx,
                    barrier,
                ),
            )
            .await;

            match outcome {
                Ok(Ok(root)) => {
                    trace!(%root, "split complete");
                    slot.set(root);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "split failed");
                    let _ = err_tx.send(e).await;
                }
                // Timeout: dropping the recursion future aborts every
                // outstanding subtree task; their results are discarded.
                Err(_) => {
                    warn!("split timed out");
                    let _ = err_tx.send(SplitError::TimedOut).await;
                }
            }
        });

        err_rx
    }

    /// Return a lazy reader over the content addressed by `root`.
    ///
    /// The reader issues fetch requests on `fetch_tx` on demand; nothing is
    /// retrieved until the first read.
    pub fn join(&self, root: Key, fetch_tx: mpsc::Sender<FetchRequest>) -> LazyChunkReader {
        LazyChunkReader::new(self.clone(), root, fetch_tx)
    }

    /// Smallest depth (and its full span) such that the span covers `size`.
    pub(crate) fn tree_depth(&self, size: u64) -> (u32, u64) {
        let mut depth = 0;
        let mut tree_size = self.chunk_size;
        while tree_size < size {
            tree_size *= self.branches;
            depth += 1;
        }
        (depth, tree_size)
    }
}

impl fmt::Debug for TreeChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeChunker")
            .field("branches", &self.branches)
            .field("hash_size", &self.hash_size)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Split one subtree covering `data[offset .. offset + size)`.
///
/// `tree_size` is the span a full child of this node would cover. Children
/// are split by independent tasks; the parent assembles its branch body
/// from their keys in subtree order and emits itself last. The first child
/// error aborts the remaining siblings.
#[allow(clippy::too_many_arguments)]
fn split_range(
    chunker: TreeChunker,
    depth: u32,
    tree_size: u64,
    data: Arc<dyn DataSource>,
    offset: u64,
    size: u64,
    chunk_tx: mpsc::Sender<Chunk>,
    barrier: Option<Arc<PersistBarrier>>,
) -> BoxFuture<'static, Result<Key, SplitError>> {
    async move {
        let mut depth = depth;
        let mut tree_size = tree_size;
        // Collapse levels where this subtree would have a single child.
        while depth > 0 && size < tree_size {
            tree_size /= chunker.branches;
            depth -= 1;
        }

        let payload = if depth == 0 {
            let mut payload = vec![0u8; SIZE_PREFIX_LEN + size as usize];
            payload[..SIZE_PREFIX_LEN].copy_from_slice(&size.to_le_bytes());
            data.read_at(&mut payload[SIZE_PREFIX_LEN..], offset)?;
            payload
        } else {
            let branch_count = size.div_ceil(tree_size);
            let mut tasks = JoinSet::new();
            for i in 0..branch_count {
                // All children but the last cover a full span.
                let child_offset = offset + i * tree_size;
                let child_size = tree_size.min(size - i * tree_size);
                let child = split_range(
                    chunker.clone(),
                    depth - 1,
                    tree_size / chunker.branches,
                    Arc::clone(&data),
                    child_offset,
                    child_size,
                    chunk_tx.clone(),
                    barrier.clone(),
                );
                tasks.spawn(async move { (i, child.await) });
            }

            let hash_size = chunker.hash_size;
            let mut payload = vec![0u8; SIZE_PREFIX_LEN + branch_count as usize * hash_size];
            payload[..SIZE_PREFIX_LEN].copy_from_slice(&size.to_le_bytes());
            while let Some(joined) = tasks.join_next().await {
                let (i, key) = match joined {
                    Ok((i, Ok(key))) => (i, key),
                    Ok((_, Err(e))) => return Err(e),
                    Err(e) => return Err(SplitError::Task(e)),
                };
                let at = SIZE_PREFIX_LEN + i as usize * hash_size;
                payload[at..at + hash_size].copy_from_slice(key.as_bytes());
            }
            payload
        };

        let key = chunker.hash.digest(&payload);
        trace!(%key, size, depth, "chunk produced");

        let mut chunk = Chunk::new(key.clone(), Bytes::from(payload), size);
        if let Some(barrier) = &barrier {
            chunk = chunk.with_guard(barrier.register());
        }
        chunk_tx
            .send(chunk)
            .await
            .map_err(|_| SplitError::StoreClosed)?;

        Ok(key)
    }
    .boxed()
}
