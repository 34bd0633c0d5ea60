use thiserror::Error;

/// Failures of the in-memory index structures. The manager lifts these into
/// `SearchError` once the shard and artifact path are known.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("vector dimension mismatch: index has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("not enough training vectors: need at least {need}, got {got}")]
    InsufficientTraining { need: usize, got: usize },
    #[error("clustered index not trained")]
    NotTrained,
    #[error("inconsistent index structure: {0}")]
    Corrupt(String),
}
