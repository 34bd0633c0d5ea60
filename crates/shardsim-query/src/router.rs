//! Cross-shard similarity search.
//!
//! A search locates the query entity, reads its vector once, asks every shard
//! for `k + 1` neighbours on a bounded worker pool, merges the candidates into
//! one ranking, drops the query entity itself and maps positions back to
//! identifiers. A failing shard is logged and left out; only a failure on the
//! query entity's own block, the version marker, or every shard at once
//! aborts the search.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use shardsim_core::{Result, SearchError, ShardCoord, ShardSimConfig};
use shardsim_directory::{EntityDirectory, EntityRecord, GraphResolver};
use shardsim_index::ShardIndexManager;

use crate::cancel::CancelToken;
use crate::merge::{rank, ShardHit};

/// One ranked neighbour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityResult {
    pub entity_id: String,
    pub entity_type: String,
    pub distance: f32,
    pub shard: ShardCoord,
    pub local_index: usize,
}

/// A neighbour enriched with graph-store metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarEntity {
    pub entity_type: String,
    pub entity_id: String,
    pub node: EntityRecord,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShardOutcome {
    Queried { hits: usize },
    Skipped { reason: String },
}

/// Results plus what happened on every shard.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub entity_id: String,
    pub query_shard: ShardCoord,
    pub query_position: usize,
    pub version: u64,
    pub results: Vec<EntityResult>,
    pub shards: Vec<(ShardCoord, ShardOutcome)>,
}

impl SearchReport {
    pub fn skipped(&self) -> usize {
        self.shards
            .iter()
            .filter(|(_, o)| matches!(o, ShardOutcome::Skipped { .. }))
            .count()
    }
}

pub struct QueryRouter {
    directory: Arc<EntityDirectory>,
    indexes: Arc<ShardIndexManager>,
    resolver: Arc<dyn GraphResolver>,
    nearest_neighbors: usize,
    pool: rayon::ThreadPool,
}

impl QueryRouter {
    pub fn new(
        config: &ShardSimConfig,
        directory: Arc<EntityDirectory>,
        resolver: Arc<dyn GraphResolver>,
    ) -> Result<Self> {
        let indexes = Arc::new(ShardIndexManager::new(config));
        Self::with_indexes(config, directory, indexes, resolver)
    }

    /// Share an existing index manager (and its cache) with this router.
    pub fn with_indexes(
        config: &ShardSimConfig,
        directory: Arc<EntityDirectory>,
        indexes: Arc<ShardIndexManager>,
        resolver: Arc<dyn GraphResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrent_shards)
            .thread_name(|i| format!("shardsim-shard-{i}"))
            .build()
            .map_err(|e| SearchError::Config(format!("worker pool: {e}")))?;
        Ok(Self {
            directory,
            indexes,
            resolver,
            nearest_neighbors: config.nearest_neighbors,
            pool,
        })
    }

    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    pub fn indexes(&self) -> &ShardIndexManager {
        &self.indexes
    }

    /// The `k` nearest other entities to `entity_id`, ascending by distance.
    pub fn search(&self, entity_id: &str, k: usize) -> Result<Vec<EntityResult>> {
        self.search_typed(entity_id, None, k)
    }

    /// As [`search`](Self::search), locating `entity_id` only among shards of
    /// `type_hint` when given.
    pub fn search_typed(&self, entity_id: &str, type_hint: Option<&str>, k: usize) -> Result<Vec<EntityResult>> {
        let token = CancelToken::new();
        Ok(self.search_report(entity_id, type_hint, k, &token)?.results)
    }

    #[instrument(skip_all, fields(entity_id = %entity_id, k = k))]
    pub fn search_report(
        &self,
        entity_id: &str,
        type_hint: Option<&str>,
        k: usize,
        cancel: &CancelToken,
    ) -> Result<SearchReport> {
        let (query_shard, query_position) = self.directory.locate_typed(entity_id, type_hint)?;
        debug!(shard = %query_shard, position = query_position, "query entity located");

        let store = self.indexes.store();
        let version = store.current_version()?;
        self.indexes.retain_version(version);
        let block = store.read(&query_shard, version)?;
        let query: Vec<f32> = block
            .row(query_position)
            .ok_or_else(|| {
                SearchError::format(
                    store.block_path(&query_shard, version),
                    format!(
                        "listing names row {query_position} but block has {} rows",
                        block.rows()
                    ),
                )
            })?
            .to_vec();

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let shards: Vec<ShardCoord> = self.directory.shards().collect();
        let per_shard: Vec<std::result::Result<Vec<ShardHit>, String>> = self.pool.install(|| {
            shards
                .par_iter()
                .map(|shard| {
                    if cancel.is_cancelled() {
                        return Err("cancelled".to_string());
                    }
                    self.query_shard(shard, version, &query, k.saturating_add(1))
                        .map_err(|e| {
                            warn!(shard = %shard, error = %e, "shard skipped");
                            e.to_string()
                        })
                })
                .collect()
        });

        if cancel.is_cancelled() {
            info!("search cancelled");
            return Err(SearchError::Cancelled);
        }

        let mut outcomes = Vec::with_capacity(shards.len());
        let mut lists = Vec::with_capacity(shards.len());
        let mut failures = Vec::new();
        for (shard, res) in shards.iter().zip(per_shard) {
            match res {
                Ok(hits) => {
                    outcomes.push((shard.clone(), ShardOutcome::Queried { hits: hits.len() }));
                    lists.push(hits);
                }
                Err(reason) => {
                    failures.push((shard.clone(), reason.clone()));
                    outcomes.push((shard.clone(), ShardOutcome::Skipped { reason }));
                }
            }
        }
        if !shards.is_empty() && failures.len() == shards.len() {
            return Err(SearchError::AllShardsFailed { failures });
        }

        let results: Vec<EntityResult> = rank(lists, &query_shard, query_position, k)
            .into_iter()
            .filter_map(|h| {
                let id = self.directory.entity_at(&h.shard, h.local_index)?;
                Some(EntityResult {
                    entity_id: id.to_string(),
                    entity_type: h.shard.entity_type.clone(),
                    distance: h.distance,
                    shard: h.shard,
                    local_index: h.local_index,
                })
            })
            .collect();

        info!(
            version,
            shards = shards.len(),
            skipped = failures.len(),
            results = results.len(),
            "search complete"
        );
        Ok(SearchReport {
            entity_id: entity_id.to_string(),
            query_shard,
            query_position,
            version,
            results,
            shards: outcomes,
        })
    }

    fn query_shard(&self, shard: &ShardCoord, version: u64, query: &[f32], k: usize) -> Result<Vec<ShardHit>> {
        let handle = self.indexes.ensure_index_at(shard, version)?;
        let listed = self
            .directory
            .entry(shard)
            .map(|e| e.entity_ids.len())
            .unwrap_or(0);
        if handle.len() != listed {
            return Err(SearchError::format(
                &handle.path,
                format!("index holds {} vectors, listing names {listed}", handle.len()),
            ));
        }
        let hits = self.indexes.query(&handle, query, k)?;
        Ok(hits
            .into_iter()
            .map(|(i, d)| ShardHit::new(shard.clone(), i, d))
            .collect())
    }

    /// Resolve `raw_key` through the graph store and return its
    /// `nearest_neighbors` most similar entities with node metadata.
    pub fn similarity_search(&self, raw_key: &str) -> Result<Vec<SimilarEntity>> {
        self.similarity_search_with(raw_key, None, self.nearest_neighbors, &CancelToken::new())
    }

    /// An explicit `type_hint` is binding. Without one, the node's graph
    /// label is tried first and dropped if no shard of that type holds the
    /// entity.
    pub fn similarity_search_with(
        &self,
        raw_key: &str,
        type_hint: Option<&str>,
        k: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<SimilarEntity>> {
        let resolved = self.resolver.resolve_external_id(raw_key)?;
        let id = resolved.entity_id.as_str();

        let report = match type_hint {
            Some(hint) => self.search_report(id, Some(hint), k, cancel)?,
            None => {
                let label = resolved.node.entity_type.as_str();
                match self.search_report(id, Some(label), k, cancel) {
                    Err(SearchError::EntityNotFound(_)) => {
                        debug!(entity_type = %label, "graph label matched no shard; searching all types");
                        self.search_report(id, None, k, cancel)?
                    }
                    other => other?,
                }
            }
        };

        Ok(report
            .results
            .into_iter()
            .map(|r| {
                let node = match self.resolver.resolve_external_id(&r.entity_id) {
                    Ok(found) => found.node,
                    Err(e) => {
                        debug!(entity_id = %r.entity_id, error = %e, "no graph metadata for neighbour");
                        EntityRecord {
                            entity_type: r.entity_type.clone(),
                            ..EntityRecord::default()
                        }
                    }
                };
                SimilarEntity {
                    entity_type: r.entity_type,
                    entity_id: r.entity_id,
                    node,
                    distance: r.distance,
                }
            })
            .collect())
    }
}
