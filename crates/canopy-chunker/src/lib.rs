//! Content-addressed Merkle tree chunking for a distributed storage layer.
//!
//! This crate provides:
//! - [`TreeChunker`] — splits an arbitrarily large byte source into a
//!   balanced tree of fixed-maximum-size chunks whose root key addresses
//!   the entire content, and joins content back from a root key.
//! - [`LazyChunkReader`] — a shareable, seekable view over a root key that
//!   demand-fetches chunks through a store channel.
//! - [`ChunkerConfig`] — hash scheme, fan-out, and timeout knobs.
//!
//! The chunker owns no storage. Splitting emits [`Chunk`](canopy_types::Chunk)
//! values on a caller-provided channel; joining issues
//! [`FetchRequest`](canopy_types::FetchRequest)s on another. Any backend that
//! services those two channels can sit on the other side.

mod chunker;
mod config;
mod error;
mod reader;
mod source;

pub use chunker::TreeChunker;
pub use config::{
    ChunkerConfig, DEFAULT_BRANCHES, DEFAULT_JOIN_TIMEOUT, DEFAULT_SPLIT_TIMEOUT, HashAlgo,
};
pub use error::{ConfigError, ReadError, SplitError};
pub use reader::LazyChunkReader;
pub use source::DataSource;
