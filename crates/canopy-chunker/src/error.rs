//! Error types for chunker operations.

use canopy_types::Key;

/// Errors rejected at chunker construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Fan-out below two would degenerate the tree into a linear chain.
    #[error("branches must be at least 2, got {branches}")]
    BranchesTooSmall {
        /// The rejected fan-out.
        branches: u64,
    },

    /// The hash scheme reports a zero-width output.
    #[error("hash scheme has zero output size")]
    EmptyHash,
}

/// Errors reported on a split's error channel.
///
/// A split reports at most one error (first wins); the channel then closes.
/// A close without a value means the split completed and the root slot is
/// populated.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// The data source failed while materializing a leaf.
    #[error("data source read failed: {0}")]
    Read(#[from] std::io::Error),

    /// The store closed the chunk channel before the split finished.
    #[error("chunk channel closed by store")]
    StoreClosed,

    /// The split deadline expired; outstanding subtree tasks were abandoned.
    #[error("split timed out")]
    TimedOut,

    /// A subtree task died without reporting a result.
    #[error("subtree task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors reported per `read_at` by the lazy reader.
///
/// None of these poison the reader; a failed read may be retried.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The store answered a fetch with an empty payload.
    #[error("chunk not found: {0}")]
    NotFound(Key),

    /// The fetch channel or a delivery signal closed without an answer.
    #[error("fetch channel closed by store")]
    StoreClosed,

    /// The read deadline expired.
    #[error("join timed out")]
    TimedOut,

    /// A delivered payload violates the chunk format.
    #[error("malformed chunk {key}: {reason}")]
    Malformed {
        /// The offending chunk.
        key: Key,
        /// What the payload got wrong.
        reason: &'static str,
    },

    /// The requested offset is at or past the end of the content.
    ///
    /// Returned once every byte up to the total size has been delivered.
    #[error("end of stream")]
    EndOfStream,
}
