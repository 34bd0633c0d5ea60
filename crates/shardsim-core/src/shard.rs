use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::BlockFormat;

/// Address of one physical embedding block and its ANN index.
///
/// The derived ordering (entity type, then partition) is the shard scan order
/// used for directory lookups and for tie-breaking during merges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardCoord {
    pub entity_type: String,
    pub partition: u32,
}

impl ShardCoord {
    pub fn new(entity_type: impl Into<String>, partition: u32) -> Self {
        Self {
            entity_type: entity_type.into(),
            partition,
        }
    }

    /// `embeddings_{type}_{partition}.v{version}.{h5|safetensors}`
    pub fn embedding_file_name(&self, version: u64, format: BlockFormat) -> String {
        format!(
            "embeddings_{}_{}.v{}.{}",
            self.entity_type,
            self.partition,
            version,
            format.extension()
        )
    }

    /// `entity_names_{type}_{partition}.json`
    pub fn listing_file_name(&self) -> String {
        format!("entity_names_{}_{}.json", self.entity_type, self.partition)
    }
}

impl fmt::Display for ShardCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.entity_type, self.partition)
    }
}
