//! Resolution of raw external keys through the upstream graph store.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use shardsim_core::{Result, SearchError};

use crate::directory::EntityDirectory;

/// Graph-store metadata for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: String,
    pub external_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    /// Canonical id, as used in the entity listings.
    pub entity_id: String,
    pub node: EntityRecord,
}

/// Upstream graph store as seen by the search engine.
pub trait GraphResolver: Send + Sync {
    /// Map a raw key (node id or a property value) to its node.
    /// `EntityNotFound` when nothing matches.
    fn resolve_external_id(&self, raw_key: &str) -> Result<ResolvedEntity>;
}

// ─────────────────────────────────────────────
// Direct resolution (no graph store)
// ─────────────────────────────────────────────

/// Treats the raw key as the canonical id; the type comes from the directory.
pub struct DirectOnlyResolver {
    directory: Arc<EntityDirectory>,
}

impl DirectOnlyResolver {
    pub fn new(directory: Arc<EntityDirectory>) -> Self {
        Self { directory }
    }
}

impl GraphResolver for DirectOnlyResolver {
    fn resolve_external_id(&self, raw_key: &str) -> Result<ResolvedEntity> {
        let (shard, _) = self.directory.locate(raw_key)?;
        Ok(ResolvedEntity {
            entity_id: raw_key.to_string(),
            node: EntityRecord {
                entity_type: shard.entity_type,
                external_properties: BTreeMap::new(),
            },
        })
    }
}

// ─────────────────────────────────────────────
// In-memory graph loaded from a JSONL export
// ─────────────────────────────────────────────

#[derive(Debug, Clone)]
struct GraphNode {
    id: String,
    record: EntityRecord,
}

/// Nodes from a graph export, one JSON object per line:
/// `{"type":"node","id":"…","labels":["Person"],"properties":{…}}`.
/// The first label is the entity type. Relationship lines are ignored.
#[derive(Debug, Clone)]
pub struct InMemoryGraph {
    nodes: Vec<GraphNode>,
    by_id: HashMap<String, usize>,
    scan_limit: usize,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ExportLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

impl InMemoryGraph {
    pub fn new(scan_limit: usize, timeout: Duration) -> Self {
        Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
            scan_limit,
            timeout,
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, record: EntityRecord) {
        let id = id.into();
        if self.by_id.contains_key(&id) {
            return;
        }
        self.by_id.insert(id.clone(), self.nodes.len());
        self.nodes.push(GraphNode { id, record });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn from_jsonl(path: &Path, scan_limit: usize, timeout: Duration) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SearchError::NotFound {
                what: "graph export",
                path: path.to_path_buf(),
            },
            _ => SearchError::Io(e),
        })?;

        let mut graph = Self::new(scan_limit, timeout);
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ExportLine = serde_json::from_str(&line)
                .map_err(|e| SearchError::format(path, format!("line {}: {e}", n + 1)))?;
            if parsed.kind != "node" {
                continue;
            }
            let Some(id) = scalar_to_string(&parsed.id) else {
                warn!(line = n + 1, "node without id skipped");
                continue;
            };
            let Some(entity_type) = parsed.labels.into_iter().next() else {
                warn!(line = n + 1, id = %id, "node without label skipped");
                continue;
            };
            let external_properties = parsed
                .properties
                .iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
                .collect();
            graph.insert(id, EntityRecord { entity_type, external_properties });
        }

        info!(path = %path.display(), nodes = graph.len(), "graph export loaded");
        Ok(graph)
    }
}

impl GraphResolver for InMemoryGraph {
    fn resolve_external_id(&self, raw_key: &str) -> Result<ResolvedEntity> {
        if let Some(&i) = self.by_id.get(raw_key) {
            let node = &self.nodes[i];
            return Ok(ResolvedEntity {
                entity_id: node.id.clone(),
                node: node.record.clone(),
            });
        }

        // Fallback: first node with a property equal to the key.
        let deadline = Instant::now() + self.timeout;
        for (visited, node) in self.nodes.iter().enumerate() {
            if visited >= self.scan_limit {
                debug!(raw_key, scan_limit = self.scan_limit, "property scan limit reached");
                break;
            }
            if Instant::now() >= deadline {
                warn!(raw_key, visited, "property scan timed out");
                break;
            }
            if node.record.external_properties.values().any(|v| v == raw_key) {
                return Ok(ResolvedEntity {
                    entity_id: node.id.clone(),
                    node: node.record.clone(),
                });
            }
        }
        Err(SearchError::EntityNotFound(raw_key.to_string()))
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::DirectoryEntry;

    const EXPORT: &str = r#"{"type":"node","id":"0","labels":["Person"],"properties":{"name":"Ada","born":1815}}
{"type":"node","id":"1","labels":["Person","Author"],"properties":{"name":"Alan"}}
{"type":"relationship","id":"0","label":"KNOWS","start":{"id":"0"},"end":{"id":"1"},"properties":{}}

{"type":"node","id":2,"labels":["Movie"],"properties":{"title":"Sneakers","tags":["a"]}}
{"type":"node","id":"3","labels":[],"properties":{}}
"#;

    fn graph(scan_limit: usize) -> InMemoryGraph {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, EXPORT).unwrap();
        InMemoryGraph::from_jsonl(&path, scan_limit, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn loads_nodes_with_first_label_as_type() {
        let g = graph(100);
        assert_eq!(g.len(), 3);

        let alan = g.resolve_external_id("1").unwrap();
        assert_eq!(alan.node.entity_type, "Person");

        let movie = g.resolve_external_id("2").unwrap();
        assert_eq!(movie.node.entity_type, "Movie");
        // Non-scalar properties are dropped.
        assert!(!movie.node.external_properties.contains_key("tags"));
    }

    #[test]
    fn property_scan_fallback() {
        let g = graph(100);
        let ada = g.resolve_external_id("Ada").unwrap();
        assert_eq!(ada.entity_id, "0");
        assert_eq!(ada.node.external_properties["born"], "1815");

        assert!(matches!(g.resolve_external_id("Grace"), Err(SearchError::EntityNotFound(_))));
    }

    #[test]
    fn property_scan_is_bounded() {
        let g = graph(1);
        assert!(g.resolve_external_id("Ada").is_ok());
        assert!(g.resolve_external_id("Sneakers").is_err());
        // Exact ids are not subject to the scan limit.
        assert!(g.resolve_external_id("2").is_ok());
    }

    #[test]
    fn zero_timeout_disables_scan() {
        let mut g = InMemoryGraph::new(100, Duration::ZERO);
        g.insert(
            "9",
            EntityRecord {
                entity_type: "Person".into(),
                external_properties: BTreeMap::from([("name".into(), "Ada".into())]),
            },
        );
        assert!(g.resolve_external_id("9").is_ok());
        assert!(g.resolve_external_id("Ada").is_err());
    }

    #[test]
    fn malformed_line_is_format_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"type\":\"node\"}\nnot json\n").unwrap();
        let err = InMemoryGraph::from_jsonl(&path, 10, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn direct_resolver_uses_directory_type() {
        let dir = EntityDirectory::from_entries(vec![DirectoryEntry {
            entity_ids: vec!["p0".into()],
            entity_type: "person".into(),
            partition_number: 0,
            entity_file: "entity_names_person_0.json".into(),
        }]);
        let r = DirectOnlyResolver::new(Arc::new(dir));
        let hit = r.resolve_external_id("p0").unwrap();
        assert_eq!(hit.entity_id, "p0");
        assert_eq!(hit.node.entity_type, "person");
        assert!(r.resolve_external_id("zz").is_err());
    }
}
