//! Consolidated entity directory.
//!
//! Maps an entity identifier to `(shard, in-shard position)` and a position
//! back to its identifier. Shards are held in scan order: regular shards by
//! `(entity_type, partition)`, then the catch-all.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use shardsim_core::{write_atomic, Result, SearchError, ShardCoord, ShardSimConfig};

use crate::entry::{DirectoryArtifact, DirectoryEntry};
use crate::listing::{discover, read_listing, ListingFile, CATCH_ALL_FILE};

/// File in the data directory holding the consolidation.
pub const DIRECTORY_FILE: &str = "entity_dictionary.json";

#[derive(Debug, Clone)]
pub struct EntityDirectory {
    entries: Vec<DirectoryEntry>,
    /// Per entry: id → first row holding it.
    positions: Vec<HashMap<String, usize>>,
    by_shard: HashMap<ShardCoord, usize>,
}

impl EntityDirectory {
    /// Assemble from entries in any order.
    pub fn from_entries(mut entries: Vec<DirectoryEntry>) -> Self {
        entries.sort_by(|a, b| {
            let ka = (a.entity_file == CATCH_ALL_FILE, a.shard());
            let kb = (b.entity_file == CATCH_ALL_FILE, b.shard());
            ka.cmp(&kb)
        });

        let mut by_shard = HashMap::with_capacity(entries.len());
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let shard = entry.shard();
            if by_shard.contains_key(&shard) {
                warn!(shard = %shard, file = %entry.entity_file, "duplicate shard in directory; keeping first");
                continue;
            }
            by_shard.insert(shard, kept.len());
            kept.push(entry);
        }

        let positions = kept
            .iter()
            .map(|e| {
                let mut map = HashMap::with_capacity(e.entity_ids.len());
                for (i, id) in e.entity_ids.iter().enumerate() {
                    map.entry(id.clone()).or_insert(i);
                }
                map
            })
            .collect();

        Self {
            entries: kept,
            positions,
            by_shard,
        }
    }

    /// Read every listing and assemble the directory.
    #[instrument(skip_all, fields(listings = listings.len()))]
    pub fn build(data_dir: &Path, listings: &[ListingFile]) -> Result<Self> {
        let mut entries = Vec::with_capacity(listings.len());
        for listing in listings {
            let ids = read_listing(data_dir, listing)?;
            debug!(shard = %listing.shard, entities = ids.len(), "listing read");
            entries.push(DirectoryEntry {
                entity_ids: ids,
                entity_type: listing.shard.entity_type.clone(),
                partition_number: listing.shard.partition,
                entity_file: listing.file_name.clone(),
            });
        }
        let dir = Self::from_entries(entries);
        info!(shards = dir.len(), entities = dir.entity_count(), "entity directory built");
        Ok(dir)
    }

    /// Write `entity_dictionary.json` into `data_dir`.
    pub fn persist(&self, data_dir: &Path) -> Result<PathBuf> {
        let path = data_dir.join(DIRECTORY_FILE);
        let artifact = DirectoryArtifact {
            all_entities: self.entries.clone(),
        };
        let bytes = serde_json::to_vec(&artifact)
            .map_err(|e| SearchError::format(&path, e.to_string()))?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Read `entity_dictionary.json` from `data_dir`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(DIRECTORY_FILE);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SearchError::NotFound {
                what: "entity directory",
                path: path.clone(),
            },
            _ => SearchError::Io(e),
        })?;
        let artifact: DirectoryArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::format(&path, e.to_string()))?;
        Ok(Self::from_entries(artifact.all_entities))
    }

    /// Load the persisted directory if it still matches the listing files on
    /// disk; otherwise rebuild and persist. Only file existence is compared,
    /// not content.
    pub fn load_or_build(config: &ShardSimConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        let listings = discover(&data_dir, config.catch_all)?;

        match Self::load(&data_dir) {
            Ok(dir) if dir.is_fresh(&listings) => {
                debug!(shards = dir.len(), "entity directory loaded");
                return Ok(dir);
            }
            Ok(_) => info!("listing files changed; rebuilding entity directory"),
            Err(SearchError::NotFound { .. }) => {}
            Err(e) => warn!(error = %e, "entity directory unreadable; rebuilding"),
        }

        let dir = Self::build(&data_dir, &listings)?;
        dir.persist(&data_dir)?;
        Ok(dir)
    }

    /// `true` when this directory references exactly the given listing files.
    pub fn is_fresh(&self, listings: &[ListingFile]) -> bool {
        let ours: BTreeSet<&str> = self.entries.iter().map(|e| e.entity_file.as_str()).collect();
        let theirs: BTreeSet<&str> = listings.iter().map(|l| l.file_name.as_str()).collect();
        ours == theirs
    }

    /// First shard in scan order holding `entity_id`.
    pub fn locate(&self, entity_id: &str) -> Result<(ShardCoord, usize)> {
        self.locate_typed(entity_id, None)
    }

    /// Like [`locate`](Self::locate), restricted to `type_hint` when given.
    pub fn locate_typed(&self, entity_id: &str, type_hint: Option<&str>) -> Result<(ShardCoord, usize)> {
        self.entries
            .iter()
            .zip(&self.positions)
            .filter(|(e, _)| type_hint.map_or(true, |t| e.entity_type == t))
            .find_map(|(e, pos)| pos.get(entity_id).map(|&i| (e.shard(), i)))
            .ok_or_else(|| SearchError::EntityNotFound(entity_id.to_string()))
    }

    pub fn entry(&self, shard: &ShardCoord) -> Option<&DirectoryEntry> {
        self.by_shard.get(shard).map(|&i| &self.entries[i])
    }

    pub fn entity_at(&self, shard: &ShardCoord, index: usize) -> Option<&str> {
        self.entry(shard)?.entity_ids.get(index).map(String::as_str)
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Shards in scan order.
    pub fn shards(&self) -> impl Iterator<Item = ShardCoord> + '_ {
        self.entries.iter().map(DirectoryEntry::shard)
    }

    /// `(shard, row count)` in scan order.
    pub fn shard_sizes(&self) -> Vec<(ShardCoord, usize)> {
        self.entries
            .iter()
            .map(|e| (e.shard(), e.entity_ids.len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.entries.iter().map(|e| e.entity_ids.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: &str, p: u32, ids: &[&str]) -> DirectoryEntry {
        DirectoryEntry {
            entity_ids: ids.iter().map(|s| s.to_string()).collect(),
            entity_type: t.into(),
            partition_number: p,
            entity_file: format!("entity_names_{t}_{p}.json"),
        }
    }

    fn catch_all(ids: &[&str]) -> DirectoryEntry {
        DirectoryEntry {
            entity_file: CATCH_ALL_FILE.into(),
            ..entry("all", 0, ids)
        }
    }

    #[test]
    fn first_match_in_scan_order() {
        let dir = EntityDirectory::from_entries(vec![
            catch_all(&["shared", "only_all"]),
            entry("person", 1, &["p2", "shared"]),
            entry("movie", 0, &["m0", "shared"]),
            entry("person", 0, &["p0", "p1"]),
        ]);

        let order: Vec<String> = dir.shards().map(|s| s.to_string()).collect();
        assert_eq!(order, ["movie_0", "person_0", "person_1", "all_0"]);

        assert_eq!(dir.locate("shared").unwrap(), (ShardCoord::new("movie", 0), 1));
        assert_eq!(dir.locate("p1").unwrap(), (ShardCoord::new("person", 0), 1));
        assert_eq!(dir.locate("only_all").unwrap(), (ShardCoord::new("all", 0), 1));
        assert!(matches!(dir.locate("nobody"), Err(SearchError::EntityNotFound(_))));
    }

    #[test]
    fn type_hint_disambiguates() {
        let dir = EntityDirectory::from_entries(vec![
            entry("movie", 0, &["42"]),
            entry("person", 0, &["7", "42"]),
        ]);
        assert_eq!(dir.locate("42").unwrap().0, ShardCoord::new("movie", 0));
        assert_eq!(
            dir.locate_typed("42", Some("person")).unwrap(),
            (ShardCoord::new("person", 0), 1)
        );
        assert!(dir.locate_typed("7", Some("movie")).is_err());
    }

    #[test]
    fn duplicate_ids_within_shard_resolve_to_first_row() {
        let dir = EntityDirectory::from_entries(vec![entry("person", 0, &["a", "b", "a"])]);
        assert_eq!(dir.locate("a").unwrap().1, 0);
    }

    #[test]
    fn reverse_mapping() {
        let dir = EntityDirectory::from_entries(vec![entry("person", 0, &["a", "b"])]);
        let shard = ShardCoord::new("person", 0);
        assert_eq!(dir.entity_at(&shard, 1), Some("b"));
        assert_eq!(dir.entity_at(&shard, 2), None);
        assert_eq!(dir.entity_at(&ShardCoord::new("person", 9), 0), None);
        assert_eq!(dir.shard_sizes(), vec![(shard, 2)]);
        assert_eq!(dir.entity_count(), 2);
    }

    #[test]
    fn duplicate_shard_keeps_first() {
        let mut second = entry("person", 0, &["x"]);
        second.entity_file = "entity_names_person_00.json".into();
        let dir = EntityDirectory::from_entries(vec![entry("person", 0, &["a"]), second]);
        assert_eq!(dir.len(), 1);
    }
}
