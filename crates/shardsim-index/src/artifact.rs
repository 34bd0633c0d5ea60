//! Persisted index artifacts.
//!
//! One bincode file per [`ArtifactKey`], named
//! `index_{type}_{partition}.v{version}.{fingerprint}.index`. The header is
//! checked against the key and the index structure is validated on load; any
//! mismatch or decode failure is an `IndexIo` error and the file is left
//! untouched.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use shardsim_core::{write_atomic, IndexKind, Result, SearchError, ShardCoord, ShardSimConfig};

use crate::ann::AnnIndex;

/// Bumped whenever the serialized layout changes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// The configuration values that shape an index's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    pub kind: IndexKind,
    pub dim: usize,
    pub num_clusters: usize,
    pub num_probes: usize,
    pub kmeans_iterations: usize,
    pub kmeans_seed: u64,
}

impl IndexParams {
    pub fn from_config(config: &ShardSimConfig) -> Self {
        Self {
            kind: config.index_kind,
            dim: config.embedding_dim,
            num_clusters: config.num_clusters,
            num_probes: config.num_probes,
            kmeans_iterations: config.kmeans_iterations,
            kmeans_seed: config.kmeans_seed,
        }
    }

    /// Short hex digest of the parameters that matter for `kind`. Cluster
    /// settings do not change a flat index, so they are left out for it.
    pub fn fingerprint(&self) -> String {
        let canonical = match self.kind {
            IndexKind::Flat => format!("kind=flat;dim={}", self.dim),
            IndexKind::Clustered => format!(
                "kind=clustered;dim={};nlist={};nprobe={};iters={};seed={}",
                self.dim, self.num_clusters, self.num_probes, self.kmeans_iterations, self.kmeans_seed
            ),
        };
        let digest = Sha256::digest(canonical.as_bytes());
        digest[..8].iter().fold(String::with_capacity(16), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}

/// Identity of one persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub shard: ShardCoord,
    pub version: u64,
    pub fingerprint: String,
}

impl ArtifactKey {
    pub fn file_name(&self) -> String {
        format!(
            "index_{}_{}.v{}.{}.index",
            self.shard.entity_type, self.shard.partition, self.version, self.fingerprint
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format_version: u32,
    pub shard: ShardCoord,
    pub version: u64,
    pub fingerprint: String,
    pub dim: usize,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
struct IndexArtifact {
    header: ArtifactHeader,
    index: AnnIndex,
}

/// Serialize and publish atomically.
pub fn write_artifact(path: &Path, key: &ArtifactKey, index: &AnnIndex) -> Result<()> {
    let artifact = IndexArtifact {
        header: ArtifactHeader {
            format_version: ARTIFACT_FORMAT_VERSION,
            shard: key.shard.clone(),
            version: key.version,
            fingerprint: key.fingerprint.clone(),
            dim: index.dim(),
            count: index.len(),
        },
        index: index.clone(),
    };
    let bytes = bincode::serialize(&artifact)
        .map_err(|e| SearchError::index_io(path, format!("encode failed: {e}")))?;
    write_atomic(path, &bytes).map_err(|e| SearchError::index_io(path, e.to_string()))
}

/// Load and validate against `key` and the expected dimension.
pub fn read_artifact(path: &Path, key: &ArtifactKey, dim: usize) -> Result<AnnIndex> {
    let bytes = std::fs::read(path).map_err(|e| SearchError::index_io(path, e.to_string()))?;
    let artifact: IndexArtifact = bincode::deserialize(&bytes)
        .map_err(|e| SearchError::index_io(path, format!("corrupt artifact: {e}")))?;
    let h = &artifact.header;

    if h.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(SearchError::index_io(
            path,
            format!("format version {} unsupported", h.format_version),
        ));
    }
    if h.shard != key.shard || h.version != key.version || h.fingerprint != key.fingerprint {
        return Err(SearchError::index_io(
            path,
            format!(
                "header names {} v{} {}, expected {} v{} {}",
                h.shard, h.version, h.fingerprint, key.shard, key.version, key.fingerprint
            ),
        ));
    }
    if h.dim != dim || artifact.index.dim() != dim {
        return Err(SearchError::index_io(
            path,
            format!("dimension {} differs from configured {dim}", h.dim),
        ));
    }
    if h.count != artifact.index.len() {
        return Err(SearchError::index_io(
            path,
            format!("header counts {} vectors, index holds {}", h.count, artifact.index.len()),
        ));
    }
    artifact
        .index
        .validate()
        .map_err(|e| SearchError::index_io(path, e.to_string()))?;
    Ok(artifact.index)
}
