use serde::{Deserialize, Serialize};

use shardsim_core::ShardCoord;

/// One shard's listing: `entity_ids[i]` names row `i` of its embedding block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub entity_ids: Vec<String>,
    pub entity_type: String,
    pub partition_number: u32,
    pub entity_file: String,
}

impl DirectoryEntry {
    pub fn shard(&self) -> ShardCoord {
        ShardCoord::new(self.entity_type.clone(), self.partition_number)
    }
}

/// On-disk shape of `entity_dictionary.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryArtifact {
    pub all_entities: Vec<DirectoryEntry>,
}
