//! # shardsim-directory
//!
//! Where does an entity live? This crate answers that in both directions:
//!
//! - [`EntityDirectory`]: entity id → `(shard, position)` and back, built
//!   from the per-shard `entity_names_*.json` listings and persisted as
//!   `entity_dictionary.json`
//! - [`GraphResolver`]: raw external key → canonical entity id plus node
//!   metadata, via [`InMemoryGraph`] or [`DirectOnlyResolver`]

pub mod directory;
pub mod entry;
pub mod listing;
pub mod resolver;

pub use directory::{EntityDirectory, DIRECTORY_FILE};
pub use entry::{DirectoryArtifact, DirectoryEntry};
pub use listing::{
    discover, parse_listing_name, read_listing, write_catch_all, write_listing, ListingFile,
    CATCH_ALL_FILE, CATCH_ALL_TYPE,
};
pub use resolver::{DirectOnlyResolver, EntityRecord, GraphResolver, InMemoryGraph, ResolvedEntity};
