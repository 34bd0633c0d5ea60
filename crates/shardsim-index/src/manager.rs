//! Lazy, idempotent per-shard index lifecycle.
//!
//! `ensure_index` returns the index for a shard at a checkpoint version,
//! building and publishing it on first use. Existence of the artifact file is
//! the only rebuild guard: a corrupt artifact surfaces as `IndexIo` and is
//! never silently replaced.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use shardsim_core::{EmbeddingStore, IndexKind, Result, SearchError, ShardCoord, ShardSimConfig};

use crate::ann::AnnIndex;
use crate::artifact::{read_artifact, write_artifact, ArtifactKey, IndexParams};
use crate::error::IndexError;
use crate::flat::FlatIndex;
use crate::ivf::IvfIndex;

/// How an [`IndexHandle`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Trained (if needed) and published by this call.
    Built,
    /// Read from an existing artifact.
    Loaded,
    /// Already resident in this manager's cache.
    Cached,
}

#[derive(Debug, Clone)]
pub struct IndexHandle {
    pub key: ArtifactKey,
    pub path: PathBuf,
    pub index: Arc<AnnIndex>,
    pub origin: IndexOrigin,
}

impl IndexHandle {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Per-shard result of [`ShardIndexManager::build_all`].
#[derive(Debug)]
pub enum BuildOutcome {
    Ready { origin: IndexOrigin, vectors: usize },
    Failed(SearchError),
}

#[derive(Debug)]
pub struct BuildReport {
    pub version: u64,
    pub shards: Vec<(ShardCoord, BuildOutcome)>,
}

impl BuildReport {
    pub fn failed(&self) -> usize {
        self.shards
            .iter()
            .filter(|(_, o)| matches!(o, BuildOutcome::Failed(_)))
            .count()
    }
}

pub struct ShardIndexManager {
    store: EmbeddingStore,
    params: IndexParams,
    index_dir: PathBuf,
    cache: DashMap<ArtifactKey, Arc<AnnIndex>>,
    /// Serializes build+publish per key within this process.
    build_locks: DashMap<ArtifactKey, Arc<Mutex<()>>>,
}

impl ShardIndexManager {
    pub fn new(config: &ShardSimConfig) -> Self {
        Self::with_parts(
            EmbeddingStore::from_config(config),
            IndexParams::from_config(config),
            config.index_dir(),
        )
    }

    pub fn with_parts(store: EmbeddingStore, params: IndexParams, index_dir: PathBuf) -> Self {
        Self {
            store,
            params,
            index_dir,
            cache: DashMap::new(),
            build_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn key(&self, shard: &ShardCoord, version: u64) -> ArtifactKey {
        ArtifactKey {
            shard: shard.clone(),
            version,
            fingerprint: self.params.fingerprint(),
        }
    }

    pub fn artifact_path(&self, key: &ArtifactKey) -> PathBuf {
        self.index_dir.join(key.file_name())
    }

    /// Index for `shard` at the current checkpoint version.
    pub fn ensure_index(&self, shard: &ShardCoord) -> Result<IndexHandle> {
        let version = self.store.current_version()?;
        self.retain_version(version);
        self.ensure_index_at(shard, version)
    }

    /// Drop cached indexes and build locks for every version but `version`.
    /// Returns the number of indexes evicted.
    pub fn retain_version(&self, version: u64) -> usize {
        let before = self.cache.len();
        self.cache.retain(|k, _| k.version == version);
        self.build_locks.retain(|k, _| k.version == version);
        let evicted = before.saturating_sub(self.cache.len());
        if evicted > 0 {
            debug!(version, evicted, "stale indexes evicted");
        }
        evicted
    }

    /// Number of indexes resident in memory.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Index for `shard` at an explicit `version`.
    #[instrument(skip_all, fields(shard = %shard, version = version))]
    pub fn ensure_index_at(&self, shard: &ShardCoord, version: u64) -> Result<IndexHandle> {
        let key = self.key(shard, version);
        let path = self.artifact_path(&key);

        if let Some(index) = self.cached(&key) {
            return Ok(IndexHandle { key, path, index, origin: IndexOrigin::Cached });
        }

        let lock = self.build_locks.entry(key.clone()).or_default().clone();
        let _guard = lock.lock();

        // Another thread may have finished while we waited.
        if let Some(index) = self.cached(&key) {
            return Ok(IndexHandle { key, path, index, origin: IndexOrigin::Cached });
        }

        let (index, origin) = if path.exists() {
            debug!(path = %path.display(), "loading index artifact");
            (read_artifact(&path, &key, self.params.dim)?, IndexOrigin::Loaded)
        } else {
            let index = self.build(shard, version, &path)?;
            write_artifact(&path, &key, &index)?;
            info!(
                kind = %self.params.kind,
                vectors = index.len(),
                path = %path.display(),
                "index built"
            );
            (index, IndexOrigin::Built)
        };

        let index = Arc::new(index);
        self.cache.insert(key.clone(), Arc::clone(&index));
        Ok(IndexHandle { key, path, index, origin })
    }

    fn cached(&self, key: &ArtifactKey) -> Option<Arc<AnnIndex>> {
        self.cache.get(key).map(|e| Arc::clone(e.value()))
    }

    fn build(&self, shard: &ShardCoord, version: u64, path: &Path) -> Result<AnnIndex> {
        let block = self.store.read(shard, version)?;
        let data = block.to_flat();
        let p = &self.params;

        let lift = |e: IndexError| match e {
            IndexError::InsufficientTraining { need, got } => SearchError::InsufficientData {
                shard: shard.clone(),
                required: need,
                provided: got,
            },
            IndexError::DimensionMismatch { expected, got } => {
                SearchError::DimensionMismatch { expected, got }
            }
            IndexError::NotTrained => SearchError::index_io(path, "index not trained"),
            IndexError::Corrupt(reason) => SearchError::index_io(path, reason),
        };

        match p.kind {
            IndexKind::Flat => {
                let mut index = FlatIndex::new(p.dim);
                index.add(&data).map_err(lift)?;
                Ok(AnnIndex::Flat(index))
            }
            IndexKind::Clustered => {
                if block.rows() < p.num_clusters {
                    return Err(SearchError::InsufficientData {
                        shard: shard.clone(),
                        required: p.num_clusters,
                        provided: block.rows(),
                    });
                }
                let mut index = IvfIndex::new(p.dim, p.num_clusters, p.num_probes);
                index
                    .train(&data, p.kmeans_iterations, p.kmeans_seed)
                    .map_err(lift)?;
                index.add(&data).map_err(lift)?;
                Ok(AnnIndex::Clustered(index))
            }
        }
    }

    /// Up to `k` `(local_index, squared_l2)` pairs, ascending.
    pub fn query(&self, handle: &IndexHandle, vector: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if vector.len() != self.params.dim {
            return Err(SearchError::DimensionMismatch {
                expected: self.params.dim,
                got: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = handle.index.search(vector, k).map_err(|e| match e {
            IndexError::DimensionMismatch { expected, got } => {
                SearchError::DimensionMismatch { expected, got }
            }
            other => SearchError::index_io(&handle.path, other.to_string()),
        })?;
        Ok(hits.into_iter().map(|(i, d)| (i as usize, d)).collect())
    }

    /// Shards too small for the configured cluster count, found from row
    /// counts alone. Always empty for a flat index.
    pub fn preflight(&self, shards: impl IntoIterator<Item = (ShardCoord, usize)>) -> Vec<SearchError> {
        if self.params.kind != IndexKind::Clustered {
            return Vec::new();
        }
        let required = self.params.num_clusters;
        shards
            .into_iter()
            .filter(|(_, rows)| *rows < required)
            .map(|(shard, provided)| {
                warn!(shard = %shard, provided, required, "shard too small for clustered index");
                SearchError::InsufficientData { shard, required, provided }
            })
            .collect()
    }

    /// Ensure an index for every shard at the current version, logging and
    /// skipping failures.
    #[instrument(skip_all)]
    pub fn build_all(&self, shards: impl IntoIterator<Item = ShardCoord>) -> Result<BuildReport> {
        let version = self.store.current_version()?;
        self.retain_version(version);
        let mut report = BuildReport { version, shards: Vec::new() };

        for shard in shards {
            let outcome = match self.ensure_index_at(&shard, version) {
                Ok(h) => BuildOutcome::Ready { origin: h.origin, vectors: h.len() },
                Err(e) => {
                    warn!(shard = %shard, error = %e, "index creation skipped");
                    BuildOutcome::Failed(e)
                }
            };
            report.shards.push((shard, outcome));
        }

        info!(
            version,
            shards = report.shards.len(),
            failed = report.failed(),
            "index check complete"
        );
        Ok(report)
    }
}
