//! Criterion benchmarks for per-shard index queries.
//!
//! Run with:
//! ```bash
//! cargo bench -p shardsim-index
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardsim_index::{FlatIndex, IvfIndex};

const DIM: usize = 64;

// ── helpers ─────────────────────────────────────────────────────────────────

fn random_block(rows: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows * DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

// ── flat vs clustered ───────────────────────────────────────────────────────

fn bench_shard_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("index/query");

    for &rows in &[1_000usize, 10_000] {
        let data = random_block(rows, 42);
        let query = random_block(1, 7);

        let mut flat = FlatIndex::new(DIM);
        flat.add(&data).unwrap();

        let mut ivf = IvfIndex::new(DIM, 32, 4);
        ivf.train(&data, 10, 1234).unwrap();
        ivf.add(&data).unwrap();

        group.bench_with_input(BenchmarkId::new("flat", rows), &rows, |b, _| {
            b.iter(|| flat.search(black_box(&query), 11).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("clustered", rows), &rows, |b, _| {
            b.iter(|| ivf.search(black_box(&query), 11).unwrap())
        });
    }

    group.finish();
}

fn bench_kmeans_train(c: &mut Criterion) {
    let data = random_block(2_000, 3);
    c.bench_function("index/ivf_train_2k", |b| {
        b.iter(|| {
            let mut ivf = IvfIndex::new(DIM, 16, 1);
            ivf.train(black_box(&data), 10, 1234).unwrap();
            ivf
        })
    });
}

// ── criterion wiring ─────────────────────────────────────────────────────────

criterion_group!(benches, bench_shard_query, bench_kmeans_train);
criterion_main!(benches);
