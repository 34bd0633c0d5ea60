//! Seeded Lloyd's k-means over row-major `f32` data.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::distance::squared_l2;
use crate::error::IndexError;

/// Stop once no centroid moves more than this (squared distance).
pub const CONVERGENCE_THRESHOLD: f64 = 1e-5;

/// Index of the centroid nearest to `v`. Ties go to the lower index.
pub fn nearest_centroid(v: &[f32], centroids: &[f32], dim: usize) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (ci, c) in centroids.chunks_exact(dim).enumerate() {
        let d = squared_l2(v, c);
        if d < best_dist {
            best_dist = d;
            best = ci;
        }
    }
    best
}

/// Train `k` centroids from `data` (`n * dim` values, `n >= k`).
///
/// Initial centroids are `k` distinct rows drawn with `seed`, so the result is
/// deterministic for a given input. A cluster that loses all its members
/// keeps its previous centroid.
pub fn kmeans(
    data: &[f32],
    dim: usize,
    k: usize,
    max_iterations: usize,
    seed: u64,
) -> Result<Vec<f32>, IndexError> {
    if dim == 0 || data.len() % dim != 0 {
        return Err(IndexError::DimensionMismatch {
            expected: dim,
            got: data.len(),
        });
    }
    let n = data.len() / dim;
    if k == 0 || n < k {
        return Err(IndexError::InsufficientTraining { need: k.max(1), got: n });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picks = rand::seq::index::sample(&mut rng, n, k).into_vec();
    picks.sort_unstable();
    let mut centroids: Vec<f32> = Vec::with_capacity(k * dim);
    for row in picks {
        centroids.extend_from_slice(&data[row * dim..(row + 1) * dim]);
    }

    let mut assignments = vec![0usize; n];
    for _ in 0..max_iterations {
        for (i, v) in data.chunks_exact(dim).enumerate() {
            assignments[i] = nearest_centroid(v, &centroids, dim);
        }

        let mut sums = vec![0.0f64; k * dim];
        let mut counts = vec![0usize; k];
        for (i, v) in data.chunks_exact(dim).enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for (s, x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(v) {
                *s += *x as f64;
            }
        }

        let mut max_shift = 0.0f64;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let old = &mut centroids[c * dim..(c + 1) * dim];
            let mut shift = 0.0f64;
            for (o, s) in old.iter_mut().zip(&sums[c * dim..(c + 1) * dim]) {
                let new = (*s / counts[c] as f64) as f32;
                shift += ((*o - new) as f64).powi(2);
                *o = new;
            }
            max_shift = max_shift.max(shift);
        }

        if max_shift < CONVERGENCE_THRESHOLD {
            break;
        }
    }

    Ok(centroids)
}
