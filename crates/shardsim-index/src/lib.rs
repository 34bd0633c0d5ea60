//! # shardsim-index
//!
//! One ANN index per shard, built lazily from that shard's embedding block
//! and persisted as a versioned artifact.
//!
//! - [`FlatIndex`]: exact squared-L2 scan, no training
//! - [`IvfIndex`]: IVF-flat with a seeded k-means coarse quantizer
//! - [`ShardIndexManager`]: `ensure_index` / `query` / `preflight` / `build_all`
//!
//! Both index kinds report squared-L2 distances, so results from flat and
//! clustered shards are directly comparable during a merge.

pub mod ann;
pub mod artifact;
pub mod distance;
pub mod error;
pub mod flat;
pub mod ivf;
pub mod kmeans;
pub mod manager;

pub use ann::AnnIndex;
pub use artifact::{ArtifactHeader, ArtifactKey, IndexParams, ARTIFACT_FORMAT_VERSION};
pub use error::IndexError;
pub use flat::FlatIndex;
pub use ivf::IvfIndex;
pub use manager::{BuildOutcome, BuildReport, IndexHandle, IndexOrigin, ShardIndexManager};
