//! Global ranking of per-shard candidate lists.

use serde::Serialize;

use shardsim_core::ShardCoord;

/// One candidate with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardHit {
    pub shard: ShardCoord,
    pub local_index: usize,
    pub distance: f32,
}

impl ShardHit {
    pub fn new(shard: ShardCoord, local_index: usize, distance: f32) -> Self {
        Self { shard, local_index, distance }
    }
}

/// Concatenate per-shard lists (already in shard scan order) and stable-sort
/// ascending by distance, so ties keep scan order.
pub fn merge_hits(per_shard: impl IntoIterator<Item = Vec<ShardHit>>) -> Vec<ShardHit> {
    let mut all: Vec<ShardHit> = per_shard.into_iter().flatten().collect();
    all.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    all
}

/// Remove the query entity's own hit. Prefers the exact `(shard, position)`
/// at distance `0.0`; otherwise drops the first `0.0` hit. At most one hit is
/// removed.
pub fn exclude_self(hits: &mut Vec<ShardHit>, shard: &ShardCoord, position: usize) -> Option<ShardHit> {
    let exact = hits
        .iter()
        .position(|h| h.distance == 0.0 && h.local_index == position && &h.shard == shard);
    let idx = exact.or_else(|| hits.iter().position(|h| h.distance == 0.0))?;
    Some(hits.remove(idx))
}

/// Merge, drop self, truncate to `k`.
pub fn rank(
    per_shard: impl IntoIterator<Item = Vec<ShardHit>>,
    shard: &ShardCoord,
    position: usize,
    k: usize,
) -> Vec<ShardHit> {
    let mut hits = merge_hits(per_shard);
    exclude_self(&mut hits, shard, position);
    hits.truncate(k);
    hits
}
