//! Error taxonomy shared by every shardsim crate.
//!
//! Whether an error is fatal depends on where it surfaces, not on the variant:
//! a `NotFound` for the query shard's embedding block aborts a search, while
//! the same error for any other shard only removes that shard from the merge.

use std::path::PathBuf;

use thiserror::Error;

use crate::shard::ShardCoord;

/// Result type alias for shardsim operations.
pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Missing or malformed configuration. No query is possible.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required artifact (embedding block, version marker, listing,
    /// directory artifact) is absent.
    #[error("{what} not found at {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    /// The identifier is absent from every shard and from the graph store.
    #[error("entity '{0}' not found")]
    EntityNotFound(String),

    /// A shard holds fewer vectors than the clustered index needs to train.
    #[error("shard {shard} has {provided} vectors, clustered index needs at least {required}")]
    InsufficientData {
        shard: ShardCoord,
        required: usize,
        provided: usize,
    },

    /// Corrupt, mismatched or unwritable index artifact.
    #[error("index artifact {}: {reason}", path.display())]
    IndexIo { path: PathBuf, reason: String },

    /// An artifact exists but its content is not what the format requires.
    #[error("format error in {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Every shard in the directory failed; carries the per-shard causes.
    #[error("all {} shards failed", failures.len())]
    AllShardsFailed { failures: Vec<(ShardCoord, String)> },

    #[error("search cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn index_io(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexIo {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
