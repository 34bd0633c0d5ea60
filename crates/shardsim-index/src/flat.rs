use serde::{Deserialize, Serialize};

use crate::distance::{squared_l2, TopK};
use crate::error::IndexError;

/// Exact index: the shard's vectors stored row-major, scanned in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.vectors.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append row-major vectors; ids continue from the current length.
    pub fn add(&mut self, data: &[f32]) -> Result<(), IndexError> {
        if self.dim == 0 || data.len() % self.dim != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: data.len(),
            });
        }
        self.vectors.extend_from_slice(data);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if (self.dim == 0 && !self.vectors.is_empty())
            || (self.dim != 0 && self.vectors.len() % self.dim != 0)
        {
            return Err(IndexError::Corrupt(format!(
                "{} values do not divide into rows of {}",
                self.vectors.len(),
                self.dim
            )));
        }
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let mut top = TopK::new(k);
        if self.dim == 0 {
            return Ok(Vec::new());
        }
        for (i, row) in self.vectors.chunks_exact(self.dim).enumerate() {
            top.push(i as u32, squared_l2(query, row));
        }
        Ok(top.into_sorted())
    }
}
