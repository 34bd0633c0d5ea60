use serde::{Deserialize, Serialize};

use shardsim_core::IndexKind;

use crate::error::IndexError;
use crate::flat::FlatIndex;
use crate::ivf::IvfIndex;

/// One shard's ANN index, of whichever family the configuration selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnnIndex {
    Flat(FlatIndex),
    Clustered(IvfIndex),
}

impl AnnIndex {
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Flat(_) => IndexKind::Flat,
            Self::Clustered(_) => IndexKind::Clustered,
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::Flat(i) => i.dim(),
            Self::Clustered(i) => i.dim(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(i) => i.len(),
            Self::Clustered(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        match self {
            Self::Flat(i) => i.validate(),
            Self::Clustered(i) => i.validate(),
        }
    }

    /// Up to `k` `(position, squared_l2)` pairs, ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        match self {
            Self::Flat(i) => i.search(query, k),
            Self::Clustered(i) => i.search(query, k),
        }
    }
}
