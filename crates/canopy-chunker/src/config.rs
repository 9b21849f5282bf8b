//! Chunker configuration.

use std::sync::Arc;
use std::time::Duration;

use canopy_types::{Blake3Scheme, HashScheme, Sha256Scheme};

/// Default maximum tree fan-out.
pub const DEFAULT_BRANCHES: u64 = 128;

/// Default upper bound on a whole split operation.
pub const DEFAULT_SPLIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default upper bound on a single range read.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Built-in content-address functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgo {
    /// SHA-256 — the default address space.
    #[default]
    Sha256,
    /// BLAKE3.
    Blake3,
}

impl HashAlgo {
    /// Resolve the algorithm to its scheme implementation.
    pub fn scheme(self) -> Arc<dyn HashScheme> {
        match self {
            HashAlgo::Sha256 => Arc::new(Sha256Scheme),
            HashAlgo::Blake3 => Arc::new(Blake3Scheme),
        }
    }
}

/// Tuning knobs for a [`TreeChunker`](crate::TreeChunker).
///
/// The chunk size is derived, not configured: `hash output size * branches`
/// (4096 bytes with the defaults).
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Content-address function.
    pub hash: HashAlgo,
    /// Maximum tree fan-out. Must be at least 2.
    pub branches: u64,
    /// Upper bound on a split operation.
    pub split_timeout: Duration,
    /// Upper bound on a single range read.
    pub join_timeout: Duration,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            hash: HashAlgo::default(),
            branches: DEFAULT_BRANCHES,
            split_timeout: DEFAULT_SPLIT_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

impl ChunkerConfig {
    /// Config with a given fan-out and defaults for everything else.
    pub fn with_branches(branches: u64) -> Self {
        Self {
            branches,
            ..Self::default()
        }
    }
}
