//! # shardsim-query
//!
//! [`QueryRouter`] ties the pieces together: directory lookup, query vector
//! read, per-shard index queries on a bounded worker pool, global merge,
//! self-exclusion and map-back to entity identifiers.

pub mod cancel;
pub mod merge;
pub mod router;

pub use cancel::CancelToken;
pub use merge::{exclude_self, merge_hits, rank, ShardHit};
pub use router::{EntityResult, QueryRouter, SearchReport, ShardOutcome, SimilarEntity};
