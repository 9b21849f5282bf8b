//! Shared types for the canopy content-addressed chunker.
//!
//! This crate defines the data model the chunker and the chunk stores agree
//! on: the content address ([`Key`]), the unit of storage ([`Chunk`]), the
//! read-side fetch protocol ([`FetchRequest`]), the caller-owned root slot
//! ([`KeySlot`]), the durability barrier ([`PersistBarrier`]), and the
//! hash-scheme indirection ([`HashScheme`]).
//!
//! The chunk payload format is the authoritative definition of the content
//! address:
//!
//! ```text
//! payload := size_le64 || body
//! body    := raw data slice            (leaf)
//!          | child keys, left to right (branch)
//! key     := H(payload)
//! ```

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Notify, oneshot};

// ---------------------------------------------------------------------------
// Content address
// ---------------------------------------------------------------------------

/// Content-addressed identifier for a chunk: the configured hash of its
/// full payload (size prefix included).
///
/// The key width equals the hash output size — 32 bytes for the default
/// SHA-256 scheme. All keys within one tree have the same width; trees built
/// with different hash schemes live in disjoint address spaces.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Wrap raw hash bytes as a key.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Copy a slice into a new key.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Key width in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is zero-width (never true for a valid key).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Key {
    fn from(bytes: [u8; 32]) -> Self {
        Self(Bytes::copy_from_slice(&bytes))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

// ---------------------------------------------------------------------------
// Hash schemes
// ---------------------------------------------------------------------------

/// Content-address function.
///
/// The chunker is parameterized by a scheme rather than a fixed algorithm;
/// swapping schemes changes the entire content-address space.
pub trait HashScheme: Send + Sync + 'static {
    /// Output (and key) width in bytes.
    fn output_size(&self) -> usize;

    /// Hash a full chunk payload into its key.
    fn digest(&self, payload: &[u8]) -> Key;
}

/// SHA-256 content addressing (the default scheme).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Scheme;

impl HashScheme for Sha256Scheme {
    fn output_size(&self) -> usize {
        32
    }

    fn digest(&self, payload: &[u8]) -> Key {
        Key::from_slice(&Sha256::digest(payload))
    }
}

/// BLAKE3 content addressing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Scheme;

impl HashScheme for Blake3Scheme {
    fn output_size(&self) -> usize {
        32
    }

    fn digest(&self, payload: &[u8]) -> Key {
        Key::from_slice(blake3::hash(payload).as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Payload format
// ---------------------------------------------------------------------------

/// Length of the little-endian subtree-size prefix on every payload.
pub const SIZE_PREFIX_LEN: usize = 8;

/// Parse the subtree-size prefix of a payload.
///
/// Returns `None` for payloads shorter than the prefix (malformed).
pub fn read_size_prefix(payload: &[u8]) -> Option<u64> {
    let prefix: [u8; SIZE_PREFIX_LEN] = payload.get(..SIZE_PREFIX_LEN)?.try_into().ok()?;
    Some(u64::from_le_bytes(prefix))
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A leaf or branch node of the tree — the unit of storage.
///
/// `size` is the byte count of the entire subtree this chunk covers, not
/// the payload length. Chunks are created by the splitter and never mutated
/// after being sent on the chunk channel.
pub struct Chunk {
    /// Content address of this chunk.
    pub key: Key,
    /// Full payload: size prefix plus body.
    pub payload: Bytes,
    /// Total size of the subtree covered by this chunk.
    pub size: u64,
    guard: Option<PersistGuard>,
}

impl Chunk {
    /// Create a chunk without a persistence guard.
    pub fn new(key: Key, payload: Bytes, size: u64) -> Self {
        Self {
            key,
            payload,
            size,
            guard: None,
        }
    }

    /// Attach a persistence guard, registered with the split's barrier.
    pub fn with_guard(mut self, guard: PersistGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Release the persistence guard.
    ///
    /// Stores call this once the chunk is durably handled. Dropping the
    /// chunk releases the guard as well, so a store that discards chunks
    /// cannot wedge a barrier waiter.
    pub fn mark_persisted(&mut self) {
        self.guard.take();
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("key", &self.key)
            .field("size", &self.size)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Fetch protocol
// ---------------------------------------------------------------------------

/// A read-side retrieval request: a key plus a one-shot delivery signal.
///
/// The store answers exactly once via [`deliver`](Self::deliver) with the
/// payload, or with empty bytes ([`not_found`](Self::not_found)) when the
/// key is unknown. Dropping the request unanswered closes the signal, which
/// the reader observes as the store going away.
pub struct FetchRequest {
    key: Key,
    reply: oneshot::Sender<Bytes>,
}

impl FetchRequest {
    /// Create a request and the receiver the reader awaits on.
    pub fn new(key: Key) -> (Self, oneshot::Receiver<Bytes>) {
        let (reply, rx) = oneshot::channel();
        (Self { key, reply }, rx)
    }

    /// The requested content address.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Deliver the payload and fire the signal.
    pub fn deliver(self, payload: Bytes) {
        // The reader may have been cancelled; a closed signal is fine.
        let _ = self.reply.send(payload);
    }

    /// Signal that the key is not in the store.
    pub fn not_found(self) {
        self.deliver(Bytes::new());
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("key", &self.key)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Root slot
// ---------------------------------------------------------------------------

/// Caller-owned, write-once slot for the root hash of a split.
///
/// The splitter populates the slot before closing its error channel, so a
/// clean close guarantees [`get`](Self::get) returns the final root.
#[derive(Debug, Default)]
pub struct KeySlot(OnceLock<Key>);

impl KeySlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root key, once the split has completed.
    pub fn get(&self) -> Option<&Key> {
        self.0.get()
    }

    /// Populate the slot. Returns `false` if it was already set.
    pub fn set(&self, key: Key) -> bool {
        self.0.set(key).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Persistence barrier
// ---------------------------------------------------------------------------

/// Opt-in barrier for waiting on chunk durability, separate from the
/// structural completion of a split.
///
/// The splitter registers one [`PersistGuard`] per chunk before sending it;
/// the store releases the guard after handling the chunk. [`wait`](Self::wait)
/// resolves once every registered guard has been released.
#[derive(Debug, Default)]
pub struct PersistBarrier {
    pending: AtomicU64,
    notify: Notify,
}

impl PersistBarrier {
    /// Create a barrier with no registered chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one chunk. Must happen before the chunk is sent.
    pub fn register(self: &Arc<Self>) -> PersistGuard {
        self.pending.fetch_add(1, Ordering::AcqRel);
        PersistGuard {
            barrier: Arc::clone(self),
        }
    }

    /// Number of chunks registered but not yet released.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every registered chunk has been released.
    ///
    /// Call after the split's error channel has closed: registration happens
    /// strictly before each send, so no further chunks can appear.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Release handle for one registered chunk. Dropping it releases the slot.
#[derive(Debug)]
pub struct PersistGuard {
    barrier: Arc<PersistBarrier>,
}

impl Drop for PersistGuard {
    fn drop(&mut self) {
        if self.barrier.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.barrier.notify.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
