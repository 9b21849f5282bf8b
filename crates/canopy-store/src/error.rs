//! Error types for chunk storage operations.

use canopy_types::Key;

/// Errors that can occur during chunk storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk was not found.
    #[error("chunk not found: {0}")]
    NotFound(Key),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
