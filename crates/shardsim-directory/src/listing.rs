//! Per-shard entity listing files in the data directory.
//!
//! - `entity_names_{type}_{partition}.json`: JSON array of identifiers
//! - `dictionary.json`: optional catch-all, `{"entities": {"all": [...]}}`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use shardsim_core::{write_atomic, Result, SearchError, ShardCoord};

pub const LISTING_PREFIX: &str = "entity_names_";
pub const LISTING_SUFFIX: &str = ".json";
pub const CATCH_ALL_FILE: &str = "dictionary.json";
pub const CATCH_ALL_TYPE: &str = "all";

/// A listing file found on disk and the shard it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFile {
    pub shard: ShardCoord,
    pub file_name: String,
}

impl ListingFile {
    pub fn is_catch_all(&self) -> bool {
        self.file_name == CATCH_ALL_FILE
    }
}

/// `entity_names_user_account_4.json` → `(user_account, 4)`. The entity type
/// may contain underscores; the partition is the last `_` token.
pub fn parse_listing_name(file_name: &str) -> Option<ShardCoord> {
    let stem = file_name
        .strip_prefix(LISTING_PREFIX)?
        .strip_suffix(LISTING_SUFFIX)?;
    let (entity_type, partition) = stem.rsplit_once('_')?;
    if entity_type.is_empty() || partition.is_empty() {
        return None;
    }
    if !partition.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(ShardCoord::new(entity_type, partition.parse().ok()?))
}

/// List every shard listing in `data_dir`, sorted in shard scan order, with
/// the catch-all last when enabled and present.
pub fn discover(data_dir: &Path, catch_all: bool) -> Result<Vec<ListingFile>> {
    let read_dir = std::fs::read_dir(data_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SearchError::NotFound {
            what: "data directory",
            path: data_dir.to_path_buf(),
        },
        _ => SearchError::Io(e),
    })?;

    let mut found = Vec::new();
    let mut has_catch_all = false;
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == CATCH_ALL_FILE {
            has_catch_all = true;
        } else if let Some(shard) = parse_listing_name(&name) {
            found.push(ListingFile { shard, file_name: name });
        }
    }
    found.sort_by(|a, b| a.shard.cmp(&b.shard));

    let catch_all_shard = ShardCoord::new(CATCH_ALL_TYPE, 0);
    if catch_all && has_catch_all {
        if found.iter().any(|l| l.shard == catch_all_shard) {
            debug!("regular listing already provides shard all_0; catch-all ignored");
        } else {
            found.push(ListingFile {
                shard: catch_all_shard,
                file_name: CATCH_ALL_FILE.to_string(),
            });
        }
    }

    debug!(data_dir = %data_dir.display(), listings = found.len(), "listings discovered");
    Ok(found)
}

#[derive(Debug, Serialize, Deserialize)]
struct CatchAllFile {
    entities: HashMap<String, Vec<String>>,
}

/// Read the identifiers of one listing file (regular or catch-all).
pub fn read_listing(data_dir: &Path, listing: &ListingFile) -> Result<Vec<String>> {
    let path = data_dir.join(&listing.file_name);
    let bytes = read_required(&path)?;
    if listing.is_catch_all() {
        let file: CatchAllFile = serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::format(&path, e.to_string()))?;
        file.entities
            .get(CATCH_ALL_TYPE)
            .cloned()
            .ok_or_else(|| SearchError::format(&path, "missing entities.all"))
    } else {
        serde_json::from_slice(&bytes).map_err(|e| SearchError::format(&path, e.to_string()))
    }
}

/// Write a regular listing for `shard`.
pub fn write_listing(data_dir: &Path, shard: &ShardCoord, ids: &[String]) -> Result<PathBuf> {
    let path = data_dir.join(shard.listing_file_name());
    let bytes = serde_json::to_vec(ids).map_err(|e| SearchError::format(&path, e.to_string()))?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

/// Write the catch-all `dictionary.json`.
pub fn write_catch_all(data_dir: &Path, ids: &[String]) -> Result<PathBuf> {
    let path = data_dir.join(CATCH_ALL_FILE);
    let file = CatchAllFile {
        entities: HashMap::from([(CATCH_ALL_TYPE.to_string(), ids.to_vec())]),
    };
    let bytes = serde_json::to_vec(&file).map_err(|e| SearchError::format(&path, e.to_string()))?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

fn read_required(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SearchError::NotFound {
            what: "entity listing",
            path: path.to_path_buf(),
        },
        _ => SearchError::Io(e),
    })
}
