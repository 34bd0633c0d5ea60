//! # shardsim-core
//!
//! Shared foundation for the shardsim partitioned similarity search engine.
//!
//! - [`ShardCoord`]: `(entity_type, partition)` address of one embedding block
//! - [`ShardSimConfig`]: explicit configuration object, loaded once and passed
//!   by reference into every component
//! - [`SearchError`]: the error taxonomy shared by all shardsim crates
//! - [`EmbeddingStore`]: read-only access to versioned per-shard embedding
//!   blocks and the checkpoint version marker
//!
//! ## On-disk layout
//! ```text
//! {project_root}/
//!   {data_directory}/
//!     entity_names_{type}_{partition}.json   ← per-shard entity listings
//!     dictionary.json                        ← optional catch-all listing
//!     entity_dictionary.json                 ← consolidated directory
//!   {checkpoint_directory}/
//!     checkpoint_version.txt                 ← version marker
//!     embeddings_{type}_{partition}.v{N}.h5     ← or .safetensors
//!     index/
//!       index_{type}_{partition}.v{N}.{fingerprint}.index
//! ```

pub mod atomic;
pub mod config;
pub mod error;
pub mod shard;
pub mod store;

pub use atomic::write_atomic;
pub use config::{BlockFormat, IndexKind, ShardSimConfig};
pub use error::{Result, SearchError};
pub use shard::ShardCoord;
pub use store::{EmbeddingBlock, EmbeddingStore, EMBEDDINGS_DATASET, VERSION_MARKER_FILE};
