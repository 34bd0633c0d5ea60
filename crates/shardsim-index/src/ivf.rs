//! IVF-flat: a k-means coarse quantizer over one shard's own vectors, with
//! each vector stored uncompressed in the inverted list of its centroid.

use serde::{Deserialize, Serialize};

use crate::distance::{squared_l2, TopK};
use crate::error::IndexError;
use crate::kmeans::{kmeans, nearest_centroid};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InvertedList {
    /// Position of each vector in the shard's block.
    ids: Vec<u32>,
    vectors: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    dim: usize,
    nlist: usize,
    nprobe: usize,
    centroids: Vec<f32>,
    lists: Vec<InvertedList>,
    ntotal: usize,
}

impl IvfIndex {
    pub fn new(dim: usize, nlist: usize, nprobe: usize) -> Self {
        Self {
            dim,
            nlist,
            nprobe: nprobe.clamp(1, nlist.max(1)),
            centroids: Vec::new(),
            lists: Vec::new(),
            ntotal: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ntotal
    }

    pub fn is_empty(&self) -> bool {
        self.ntotal == 0
    }

    /// Fit the coarse quantizer. Needs at least `nlist` vectors.
    pub fn train(&mut self, data: &[f32], max_iterations: usize, seed: u64) -> Result<(), IndexError> {
        self.centroids = kmeans(data, self.dim, self.nlist, max_iterations, seed)?;
        self.lists = vec![InvertedList::default(); self.nlist];
        Ok(())
    }

    /// Assign each row to its nearest centroid; ids continue from `len()`.
    pub fn add(&mut self, data: &[f32]) -> Result<(), IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        if data.len() % self.dim != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: data.len(),
            });
        }
        for v in data.chunks_exact(self.dim) {
            let c = nearest_centroid(v, &self.centroids, self.dim);
            let list = &mut self.lists[c];
            list.ids.push(self.ntotal as u32);
            list.vectors.extend_from_slice(v);
            self.ntotal += 1;
        }
        Ok(())
    }

    /// Scan the `nprobe` lists whose centroids are nearest to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }

        let mut probes = TopK::new(self.nprobe);
        for (ci, c) in self.centroids.chunks_exact(self.dim).enumerate() {
            probes.push(ci as u32, squared_l2(query, c));
        }

        let mut top = TopK::new(k);
        for (ci, _) in probes.into_sorted() {
            let list = &self.lists[ci as usize];
            for (id, v) in list.ids.iter().zip(list.vectors.chunks_exact(self.dim)) {
                top.push(*id, squared_l2(query, v));
            }
        }
        Ok(top.into_sorted())
    }

    /// Structural consistency of a deserialized index: the shape every
    /// `search` relies on to stay in bounds.
    pub fn validate(&self) -> Result<(), IndexError> {
        let corrupt = |msg: String| Err(IndexError::Corrupt(msg));
        if self.dim == 0 || self.nlist == 0 {
            return corrupt(format!("dim {} nlist {}", self.dim, self.nlist));
        }
        if self.nlist.checked_mul(self.dim) != Some(self.centroids.len()) {
            return corrupt(format!(
                "{} centroid values for {} lists of dimension {}",
                self.centroids.len(),
                self.nlist,
                self.dim
            ));
        }
        if self.lists.len() != self.nlist {
            return corrupt(format!("{} inverted lists, expected {}", self.lists.len(), self.nlist));
        }
        if self.nprobe == 0 || self.nprobe > self.nlist {
            return corrupt(format!("nprobe {} outside 1..={}", self.nprobe, self.nlist));
        }

        let mut stored = 0usize;
        for (ci, list) in self.lists.iter().enumerate() {
            if list.ids.len().checked_mul(self.dim) != Some(list.vectors.len()) {
                return corrupt(format!(
                    "list {ci} has {} ids but {} values",
                    list.ids.len(),
                    list.vectors.len()
                ));
            }
            if let Some(id) = list.ids.iter().find(|&&id| id as usize >= self.ntotal) {
                return corrupt(format!("list {ci} names position {id} of {}", self.ntotal));
            }
            stored += list.ids.len();
        }
        if stored != self.ntotal {
            return corrupt(format!("lists hold {stored} vectors, index counts {}", self.ntotal));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn truncate_lists(&mut self, n: usize) {
        self.lists.truncate(n);
    }
}
