//! End-to-end searches over a staged project directory.

use std::sync::Arc;
use std::time::Duration;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use shardsim_core::{BlockFormat, EmbeddingStore, IndexKind, SearchError, ShardCoord, ShardSimConfig};
use shardsim_directory::{write_listing, DirectOnlyResolver, EntityDirectory, InMemoryGraph};
use shardsim_index::IndexOrigin;
use shardsim_query::{CancelToken, QueryRouter, ShardOutcome};

// ── fixture ─────────────────────────────────────────────────────────────────

struct Project {
    _dir: TempDir,
    cfg: ShardSimConfig,
    store: EmbeddingStore,
}

impl Project {
    fn new(dim: usize, kind: IndexKind, num_clusters: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let cfg = ShardSimConfig {
            project_root: dir.path().to_path_buf(),
            embedding_dim: dim,
            block_format: BlockFormat::Safetensors,
            index_kind: kind,
            num_clusters,
            num_probes: num_clusters.max(1),
            nearest_neighbors: 3,
            max_concurrent_shards: 2,
            ..ShardSimConfig::default()
        };
        std::fs::create_dir_all(cfg.data_dir()).unwrap();
        let store = EmbeddingStore::from_config(&cfg);
        store.write_version(1).unwrap();
        Self { _dir: dir, cfg, store }
    }

    /// Stage a shard whose ids are `{type}{partition}_{row}`.
    fn shard(&self, t: &str, p: u32, rows: &[Vec<f32>]) -> &Self {
        self.shard_at(t, p, 1, rows);
        let shard = ShardCoord::new(t, p);
        let ids: Vec<String> = (0..rows.len()).map(|i| format!("{t}{p}_{i}")).collect();
        write_listing(&self.cfg.data_dir(), &shard, &ids).unwrap();
        self
    }

    fn shard_at(&self, t: &str, p: u32, version: u64, rows: &[Vec<f32>]) {
        let dim = self.cfg.embedding_dim;
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let m = Array2::from_shape_vec((rows.len(), dim), flat).unwrap();
        self.store.write(&ShardCoord::new(t, p), version, &m).unwrap();
    }

    fn directory(&self) -> Arc<EntityDirectory> {
        Arc::new(EntityDirectory::load_or_build(&self.cfg).unwrap())
    }

    fn router(&self) -> QueryRouter {
        let dir = self.directory();
        let resolver = Arc::new(DirectOnlyResolver::new(Arc::clone(&dir)));
        QueryRouter::new(&self.cfg, dir, resolver).unwrap()
    }
}

fn random_rows(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn scalar_rows(xs: &[f32]) -> Vec<Vec<f32>> {
    xs.iter().map(|x| vec![*x]).collect()
}

// ── ranking contract ────────────────────────────────────────────────────────

#[test]
fn test_results_bounded_sorted_without_self() {
    let p = Project::new(4, IndexKind::Flat, 1);
    p.shard("person", 0, &random_rows(6, 4, 1))
        .shard("person", 1, &random_rows(5, 4, 2))
        .shard("movie", 0, &random_rows(4, 4, 3));
    let router = p.router();

    for entry in router.directory().entries().to_vec() {
        for id in &entry.entity_ids {
            for k in [1usize, 3, 50] {
                let results = router.search(id, k).unwrap();
                assert!(results.len() <= k);
                assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
                assert!(results.iter().all(|r| &r.entity_id != id), "{id} returned itself");
            }
            // 15 entities in total, one of them is the query.
            assert_eq!(router.search(id, 50).unwrap().len(), 14);
        }
    }
}

#[test]
fn test_self_excluded_for_first_row() {
    let p = Project::new(4, IndexKind::Flat, 1);
    p.shard("person", 0, &random_rows(5, 4, 10))
        .shard("person", 1, &random_rows(5, 4, 11));
    let router = p.router();

    let results = router.search("person0_0", 4).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.entity_id != "person0_0"));
    assert!(results[0].distance > 0.0);
}

#[test]
fn test_three_shard_merge_with_provenance() {
    // One-dimensional vectors, query at 0: squared distances are x².
    let p = Project::new(1, IndexKind::Flat, 1);
    p.shard("a", 0, &scalar_rows(&[1.0, 5.0, 9.0]))
        .shard("b", 0, &scalar_rows(&[2.0, 3.0]))
        .shard("c", 0, &scalar_rows(&[4.0]))
        .shard("q", 0, &scalar_rows(&[0.0]));
    let router = p.router();

    let results = router.search("q0_0", 3).unwrap();
    let got: Vec<(&str, usize, f32)> = results
        .iter()
        .map(|r| (r.entity_id.as_str(), r.local_index, r.distance))
        .collect();
    assert_eq!(got, vec![("a0_0", 0, 1.0), ("b0_0", 0, 4.0), ("b0_1", 1, 9.0)]);
    assert_eq!(results[1].shard, ShardCoord::new("b", 0));
    assert_eq!(results[1].entity_type, "b");
}

#[test]
fn test_duplicate_vector_survives_self_exclusion() {
    let p = Project::new(1, IndexKind::Flat, 1);
    p.shard("a", 0, &scalar_rows(&[0.0, 2.0]))
        .shard("b", 0, &scalar_rows(&[0.0]));
    let router = p.router();

    // b0_0 and a0_0 share a vector; only the query itself is dropped.
    let results = router.search("b0_0", 2).unwrap();
    assert_eq!(results[0].entity_id, "a0_0");
    assert_eq!(results[0].distance, 0.0);
    assert_eq!(results[1].entity_id, "a0_1");
}

#[test]
fn test_zero_k_is_empty() {
    let p = Project::new(2, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(3, 2, 1));
    assert!(p.router().search("a0_0", 0).unwrap().is_empty());
}

// ── failure handling ────────────────────────────────────────────────────────

#[test]
fn test_partial_failure_skips_small_shard() {
    let p = Project::new(4, IndexKind::Clustered, 3);
    let person0 = random_rows(20, 4, 1);
    let person1 = random_rows(12, 4, 2);
    p.shard("person", 0, &person0)
        .shard("person", 1, &person1)
        .shard("tiny", 0, &random_rows(2, 4, 3));
    let router = p.router();

    let report = router
        .search_report("person0_4", None, 5, &CancelToken::new())
        .unwrap();
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.skipped(), 1);

    let (shard, outcome) = &report.shards[2];
    assert_eq!(shard, &ShardCoord::new("tiny", 0));
    match outcome {
        ShardOutcome::Skipped { reason } => assert!(reason.contains("at least 3"), "{reason}"),
        other => panic!("expected skip, got {other:?}"),
    }
    assert!(report.results.iter().all(|r| r.entity_type == "person"));

    // Every list is probed, so the survivors match an exact scan of the
    // two person shards.
    let query = &person0[4];
    let mut exact: Vec<(String, f32)> = person0
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("person0_{i}"), v))
        .chain(person1.iter().enumerate().map(|(i, v)| (format!("person1_{i}"), v)))
        .filter(|(id, _)| *id != "person0_4")
        .map(|(id, v)| (id, v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum()))
        .collect();
    exact.sort_by(|a, b| a.1.total_cmp(&b.1));
    exact.truncate(5);

    let got_ids: Vec<&str> = report.results.iter().map(|r| r.entity_id.as_str()).collect();
    let want_ids: Vec<&str> = exact.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(got_ids, want_ids);
    for (r, (_, d)) in report.results.iter().zip(&exact) {
        assert!((r.distance - d).abs() < 1e-5, "{} vs {d}", r.distance);
    }

    // The configuration problem is visible before searching.
    let preflight = router.indexes().preflight(router.directory().shard_sizes());
    assert_eq!(preflight.len(), 1);
}

#[test]
fn test_all_shards_failed() {
    let p = Project::new(2, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(3, 2, 1));
    // Block grows behind the listing's back: every shard disagrees.
    p.shard_at("a", 0, 1, &random_rows(4, 2, 2));

    let err = p.router().search("a0_0", 2).unwrap_err();
    match err {
        SearchError::AllShardsFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, ShardCoord::new("a", 0));
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn test_unknown_entity() {
    let p = Project::new(2, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(3, 2, 1));
    assert!(matches!(
        p.router().search("nobody", 2),
        Err(SearchError::EntityNotFound(_))
    ));
}

#[test]
fn test_missing_version_marker_is_fatal() {
    let p = Project::new(2, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(3, 2, 1));
    let router = p.router();
    std::fs::remove_file(p.store.version_marker_path()).unwrap();
    assert!(matches!(router.search("a0_0", 2), Err(SearchError::NotFound { .. })));
}

#[test]
fn test_missing_query_block_is_fatal() {
    let p = Project::new(2, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(3, 2, 1))
        .shard("b", 0, &random_rows(3, 2, 2));
    let router = p.router();
    std::fs::remove_file(p.store.block_path(&ShardCoord::new("a", 0), 1)).unwrap();

    assert!(matches!(router.search("a0_0", 2), Err(SearchError::NotFound { .. })));
    // Other entities still search fine; shard a is just skipped.
    assert_eq!(router.search("b0_0", 5).unwrap().len(), 2);
}

#[test]
fn test_cancelled_search() {
    let p = Project::new(2, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(3, 2, 1));
    let router = p.router();

    let token = CancelToken::new();
    token.cancel();
    let err = router.search_report("a0_0", None, 2, &token).unwrap_err();
    assert!(matches!(err, SearchError::Cancelled));
}

// ── versions ────────────────────────────────────────────────────────────────

#[test]
fn test_new_version_uses_new_blocks() {
    let p = Project::new(1, IndexKind::Flat, 1);
    p.shard("a", 0, &scalar_rows(&[0.0, 1.0, 3.0]));
    let router = p.router();

    let v1 = router.search("a0_0", 1).unwrap();
    assert_eq!((v1[0].entity_id.as_str(), v1[0].distance), ("a0_1", 1.0));

    p.shard_at("a", 0, 2, &scalar_rows(&[0.0, 5.0, 2.0]));
    p.store.write_version(2).unwrap();

    let v2 = router.search("a0_0", 1).unwrap();
    assert_eq!((v2[0].entity_id.as_str(), v2[0].distance), ("a0_2", 4.0));

    let artifacts = std::fs::read_dir(p.cfg.index_dir()).unwrap().count();
    assert_eq!(artifacts, 2);

    // Only the current version stays resident.
    assert_eq!(router.indexes().cached_len(), 1);
    let old = router.indexes().ensure_index_at(&ShardCoord::new("a", 0), 1).unwrap();
    assert_eq!(old.origin, IndexOrigin::Loaded);
}

// ── graph resolution ────────────────────────────────────────────────────────

#[test]
fn test_similarity_search_through_graph_export() {
    let p = Project::new(1, IndexKind::Flat, 1);
    p.shard("Person", 0, &scalar_rows(&[0.0, 1.0, 2.0]))
        .shard("Movie", 0, &scalar_rows(&[0.5]));

    let export = p.cfg.project_root.join("export.json");
    std::fs::write(
        &export,
        concat!(
            r#"{"type":"node","id":"Person0_0","labels":["Person"],"properties":{"name":"Ada"}}"#, "\n",
            r#"{"type":"node","id":"Person0_1","labels":["Person"],"properties":{"name":"Alan"}}"#, "\n",
            r#"{"type":"node","id":"Movie0_0","labels":["Movie"],"properties":{"title":"Sneakers"}}"#, "\n",
        ),
    )
    .unwrap();
    let graph = InMemoryGraph::from_jsonl(&export, 1000, Duration::from_secs(5)).unwrap();

    let router = QueryRouter::new(&p.cfg, p.directory(), Arc::new(graph)).unwrap();
    let similar = router.similarity_search("Ada").unwrap();

    assert_eq!(similar.len(), 3);
    assert_eq!(similar[0].entity_id, "Movie0_0");
    assert_eq!(similar[0].node.external_properties["title"], "Sneakers");
    assert_eq!(similar[1].entity_id, "Person0_1");
    assert_eq!(similar[1].node.external_properties["name"], "Alan");
    // Not in the export: type from the shard, no properties.
    assert_eq!(similar[2].entity_id, "Person0_2");
    assert_eq!(similar[2].entity_type, "Person");
    assert!(similar[2].node.external_properties.is_empty());

    assert!(matches!(
        router.similarity_search("Grace"),
        Err(SearchError::EntityNotFound(_))
    ));
}

#[test]
fn test_graph_label_case_differs_from_listing_type() {
    let p = Project::new(1, IndexKind::Flat, 1);
    p.shard("person", 0, &scalar_rows(&[0.0, 1.0]));

    let mut graph = InMemoryGraph::new(100, Duration::from_secs(1));
    graph.insert(
        "person0_0",
        shardsim_directory::EntityRecord {
            entity_type: "Person".into(),
            ..Default::default()
        },
    );
    let router = QueryRouter::new(&p.cfg, p.directory(), Arc::new(graph)).unwrap();
    let similar = router.similarity_search("person0_0").unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].entity_id, "person0_1");
}

#[test]
fn test_single_worker_matches_pool() {
    let p = Project::new(4, IndexKind::Flat, 1);
    p.shard("a", 0, &random_rows(8, 4, 1))
        .shard("b", 0, &random_rows(8, 4, 2))
        .shard("c", 0, &random_rows(8, 4, 3));

    let wide = p.router().search("b0_3", 6).unwrap();

    let narrow_cfg = ShardSimConfig { max_concurrent_shards: 1, ..p.cfg.clone() };
    let dir = p.directory();
    let narrow = QueryRouter::new(&narrow_cfg, Arc::clone(&dir), Arc::new(DirectOnlyResolver::new(dir)))
        .unwrap()
        .search("b0_3", 6)
        .unwrap();
    assert_eq!(wide, narrow);
}
