//! Lazy, seekable reading over a root key.

use bytes::Bytes;
use canopy_types::{FetchRequest, Key, SIZE_PREFIX_LEN, read_size_prefix};
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, trace};

use crate::chunker::TreeChunker;
use crate::error::ReadError;

/// A lazy reader over the content addressed by a root key.
///
/// Nothing is fetched until the first read; the root chunk is then fetched
/// once and cached, and every range read descends the tree fetching only
/// the chunks that overlap the requested window. Sibling fetches run in
/// parallel and write into disjoint partitions of the output buffer.
///
/// The reader is safe to share: all methods take `&self`, and concurrent
/// reads produce the same bytes as sequential ones. Errors are per-read;
/// a failed read does not poison the reader.
pub struct LazyChunkReader {
    chunker: TreeChunker,
    root: Key,
    fetch_tx: mpsc::Sender<FetchRequest>,
    root_payload: OnceCell<Bytes>,
}

impl LazyChunkReader {
    pub(crate) fn new(chunker: TreeChunker, root: Key, fetch_tx: mpsc::Sender<FetchRequest>) -> Self {
        Self {
            chunker,
            root,
            fetch_tx,
            root_payload: OnceCell::new(),
        }
    }

    /// The root key this reader assembles.
    pub fn key(&self) -> &Key {
        &self.root
    }

    /// Total size of the content, learned from the root chunk.
    pub async fn size(&self) -> Result<u64, ReadError> {
        let payload = self.root_payload().await?;
        read_size_prefix(payload).ok_or(ReadError::Malformed {
            key: self.root.clone(),
            reason: "payload shorter than size prefix",
        })
    }

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes read, clipped to the end of the content.
    /// A read starting at or past the end returns [`ReadError::EndOfStream`];
    /// every earlier read delivers at least one byte. Each call is bounded
    /// by the chunker's join timeout; dropping the returned future abandons
    /// all in-flight fetches without touching `buf`.
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, ReadError> {
        match tokio::time::timeout(self.chunker.join_timeout, self.read_at_inner(buf, offset)).await
        {
            Ok(result) => result,
            Err(_) => Err(ReadError::TimedOut),
        }
    }

    /// Materialize the entire content sequentially.
    pub async fn read_to_end(&self) -> Result<Vec<u8>, ReadError> {
        let total = self.size().await?;
        let mut data = vec![0u8; total as usize];
        let mut offset = 0u64;
        while offset < total {
            let n = self.read_at(&mut data[offset as usize..], offset).await?;
            offset += n as u64;
        }
        Ok(data)
    }

    async fn read_at_inner(&self, buf: &mut [u8], offset: u64) -> Result<usize, ReadError> {
        let root_payload = self.root_payload().await?.clone();
        let total = read_size_prefix(&root_payload).ok_or(ReadError::Malformed {
            key: self.root.clone(),
            reason: "payload shorter than size prefix",
        })?;

        if offset >= total {
            return Err(ReadError::EndOfStream);
        }
        let want = (buf.len() as u64).min(total - offset);
        if want == 0 {
            return Ok(0);
        }
        debug!(root = %self.root, offset, want, total, "range read");

        let (depth, tree_size) = self.chunker.tree_depth(total);
        self.read_range(
            &mut buf[..want as usize],
            offset,
            depth,
            tree_size / self.chunker.branches,
            self.root.clone(),
            root_payload,
        )
        .await?;

        Ok(want as usize)
    }

    /// Fetch (and cache) the root chunk. Concurrent first reads coalesce
    /// into a single fetch.
    async fn root_payload(&self) -> Result<&Bytes, ReadError> {
        self.root_payload
            .get_or_try_init(|| self.fetch(self.root.clone()))
            .await
    }

    /// Issue one fetch request and await its delivery signal.
    ///
    /// An empty payload is the store's not-found answer; a closed signal
    /// means the store went away.
    async fn fetch(&self, key: Key) -> Result<Bytes, ReadError> {
        let (request, delivery) = FetchRequest::new(key.clone());
        self.fetch_tx
            .send(request)
            .await
            .map_err(|_| ReadError::StoreClosed)?;
        let payload = delivery.await.map_err(|_| ReadError::StoreClosed)?;

        if payload.is_empty() {
            return Err(ReadError::NotFound(key));
        }
        if payload.len() < SIZE_PREFIX_LEN {
            return Err(ReadError::Malformed {
                key,
                reason: "payload shorter than size prefix",
            });
        }
        trace!(%key, len = payload.len(), "chunk delivered");
        Ok(payload)
    }

    /// Copy `[offset, offset + buf.len())` of the subtree under `payload`
    /// into `buf`. Offsets are relative to this node's subtree.
    ///
    /// `tree_size` is the span of a full child. Children overlapping the
    /// window are fetched in parallel, each writing its own partition of
    /// `buf`; the first error drops the remaining sibling futures.
    fn read_range<'a>(
        &'a self,
        buf: &'a mut [u8],
        offset: u64,
        depth: u32,
        tree_size: u64,
        key: Key,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<(), ReadError>> {
        async move {
            let node_size = read_size_prefix(&payload).ok_or(ReadError::Malformed {
                key: key.clone(),
                reason: "payload shorter than size prefix",
            })?;

            let mut depth = depth;
            let mut tree_size = tree_size;
            // Short right spines skip levels, mirroring the split side.
            while depth > 0 && node_size < tree_size {
                tree_size /= self.chunker.branches;
                depth -= 1;
            }

            let body = &payload[SIZE_PREFIX_LEN..];
            let end = offset + buf.len() as u64;

            if depth == 0 {
                if (body.len() as u64) < end {
                    return Err(ReadError::Malformed {
                        key,
                        reason: "leaf body shorter than its subtree size",
                    });
                }
                buf.copy_from_slice(&body[offset as usize..end as usize]);
                return Ok(());
            }

            let hash_size = self.chunker.hash_size;
            if body.len() % hash_size != 0 {
                return Err(ReadError::Malformed {
                    key,
                    reason: "branch body not a multiple of the key width",
                });
            }
            let children = (body.len() / hash_size) as u64;
            let start = offset / tree_size;
            let stop = end.div_ceil(tree_size);
            if stop > children {
                return Err(ReadError::Malformed {
                    key,
                    reason: "branch body missing children for the range",
                });
            }

            let mut subreads = Vec::with_capacity((stop - start) as usize);
            let mut rest = buf;
            for i in start..stop {
                let child_start = i * tree_size;
                let child_end = child_start + tree_size;
                let lo = child_start.max(offset);
                let hi = child_end.min(end);

                let (window, tail) = std::mem::take(&mut rest).split_at_mut((hi - lo) as usize);
                rest = tail;

                let at = i as usize * hash_size;
                let child_key = Key::from_slice(&body[at..at + hash_size]);
                subreads.push(async move {
                    let child_payload = self.fetch(child_key.clone()).await?;
                    self.read_range(
                        window,
                        lo - child_start,
                        depth - 1,
                        tree_size / self.chunker.branches,
                        child_key,
                        child_payload,
                    )
                    .await
                });
            }
            try_join_all(subreads).await?;
            Ok(())
        }
        .boxed()
    }
}
