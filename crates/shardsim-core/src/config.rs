//! Engine configuration.
//!
//! One [`ShardSimConfig`] is built at startup (from the environment or from a
//! YAML file) and passed by reference into every component.
//!
//! | Variable                          | Default   | Description                                  |
//! |-----------------------------------|-----------|----------------------------------------------|
//! | `SHARDSIM_PROJECT_ROOT`           | `.`       | Root that data and checkpoint dirs hang off  |
//! | `SHARDSIM_DATA_DIRECTORY`         | `data`    | Entity listings and the directory artifact   |
//! | `SHARDSIM_CHECKPOINT_DIRECTORY`   | `model`   | Embedding blocks, version marker, indexes    |
//! | `SHARDSIM_EMBEDDING_DIM`          | `400`     | Vector dimension `D`                         |
//! | `SHARDSIM_BLOCK_FORMAT`           | `hdf5`    | Block file format, `hdf5` or `safetensors`   |
//! | `SHARDSIM_INDEX_KIND`             | `flat`    | `flat` or `clustered`                        |
//! | `SHARDSIM_NUM_CLUSTERS`           | `16`      | Coarse centroids per clustered index         |
//! | `SHARDSIM_NUM_PROBES`             | `1`       | Inverted lists visited per clustered query   |
//! | `SHARDSIM_NEAREST_NEIGHBORS`      | `10`      | Default K                                    |
//! | `SHARDSIM_KMEANS_ITERATIONS`      | `25`      | Max k-means iterations                       |
//! | `SHARDSIM_KMEANS_SEED`            | `1234`    | k-means initialisation seed                  |
//! | `SHARDSIM_MAX_CONCURRENT_SHARDS`  | `4`       | Worker threads for shard fan-out             |
//! | `SHARDSIM_CATCH_ALL`              | `true`    | Register `dictionary.json` as shard `(all,0)`|
//! | `SHARDSIM_RESOLVER_SCAN_LIMIT`    | `100000`  | Max nodes visited by the property scan       |
//! | `SHARDSIM_RESOLVER_TIMEOUT_MS`    | `5000`    | Time limit of the property scan              |
//! | `SHARDSIM_LOG_LEVEL`              | `info`    | tracing filter                               |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// ANN index family used for every shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact brute-force squared-L2 scan.
    Flat,
    /// IVF-flat: k-means coarse quantizer plus flat inverted lists.
    Clustered,
}

impl FromStr for IndexKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "l2" | "indexflatl2" => Ok(Self::Flat),
            "clustered" | "ivf" | "ivfflat" | "indexivfflat" => Ok(Self::Clustered),
            other => Err(SearchError::Config(format!("unknown index kind '{other}'"))),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Clustered => f.write_str("clustered"),
        }
    }
}

/// On-disk format of the per-shard embedding blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockFormat {
    /// `.h5` with an `embeddings` dataset, as written by the training job.
    /// Needs the `hdf5` cargo feature.
    Hdf5,
    /// `.safetensors` with an `embeddings` tensor.
    Safetensors,
}

impl BlockFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Hdf5 => "h5",
            Self::Safetensors => "safetensors",
        }
    }
}

impl FromStr for BlockFormat {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hdf5" | "h5" => Ok(Self::Hdf5),
            "safetensors" => Ok(Self::Safetensors),
            other => Err(SearchError::Config(format!("unknown block format '{other}'"))),
        }
    }
}

impl fmt::Display for BlockFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hdf5 => f.write_str("hdf5"),
            Self::Safetensors => f.write_str("safetensors"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSimConfig {
    pub project_root: PathBuf,
    /// Relative to `project_root`.
    pub data_directory: String,
    /// Relative to `project_root`.
    pub checkpoint_directory: String,
    pub embedding_dim: usize,
    pub block_format: BlockFormat,
    pub index_kind: IndexKind,
    pub num_clusters: usize,
    pub num_probes: usize,
    pub nearest_neighbors: usize,
    pub kmeans_iterations: usize,
    pub kmeans_seed: u64,
    pub max_concurrent_shards: usize,
    /// Register `dictionary.json` as the catch-all shard `(all, 0)`.
    pub catch_all: bool,
    pub resolver_scan_limit: usize,
    pub resolver_timeout_ms: u64,
    pub log_level: String,
}

impl Default for ShardSimConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            data_directory: "data".into(),
            checkpoint_directory: "model".into(),
            embedding_dim: 400,
            block_format: BlockFormat::Hdf5,
            index_kind: IndexKind::Flat,
            num_clusters: 16,
            num_probes: 1,
            nearest_neighbors: 10,
            kmeans_iterations: 25,
            kmeans_seed: 1234,
            max_concurrent_shards: 4,
            catch_all: true,
            resolver_scan_limit: 100_000,
            resolver_timeout_ms: 5_000,
            log_level: "info".into(),
        }
    }
}

impl ShardSimConfig {
    /// Load configuration from `SHARDSIM_*` environment variables, applying
    /// defaults where a variable is absent or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            project_root:          PathBuf::from(env_str(&get, "SHARDSIM_PROJECT_ROOT", ".")),
            data_directory:        env_str(&get, "SHARDSIM_DATA_DIRECTORY", &d.data_directory),
            checkpoint_directory:  env_str(&get, "SHARDSIM_CHECKPOINT_DIRECTORY", &d.checkpoint_directory),
            embedding_dim:         env_parse(&get, "SHARDSIM_EMBEDDING_DIM", d.embedding_dim),
            block_format:          env_parse(&get, "SHARDSIM_BLOCK_FORMAT", d.block_format),
            index_kind:            env_parse(&get, "SHARDSIM_INDEX_KIND", d.index_kind),
            num_clusters:          env_parse(&get, "SHARDSIM_NUM_CLUSTERS", d.num_clusters),
            num_probes:            env_parse(&get, "SHARDSIM_NUM_PROBES", d.num_probes),
            nearest_neighbors:     env_parse(&get, "SHARDSIM_NEAREST_NEIGHBORS", d.nearest_neighbors),
            kmeans_iterations:     env_parse(&get, "SHARDSIM_KMEANS_ITERATIONS", d.kmeans_iterations),
            kmeans_seed:           env_parse(&get, "SHARDSIM_KMEANS_SEED", d.kmeans_seed),
            max_concurrent_shards: env_parse(&get, "SHARDSIM_MAX_CONCURRENT_SHARDS", d.max_concurrent_shards),
            catch_all:             env_bool(&get, "SHARDSIM_CATCH_ALL", d.catch_all),
            resolver_scan_limit:   env_parse(&get, "SHARDSIM_RESOLVER_SCAN_LIMIT", d.resolver_scan_limit),
            resolver_timeout_ms:   env_parse(&get, "SHARDSIM_RESOLVER_TIMEOUT_MS", d.resolver_timeout_ms),
            log_level:             env_str(&get, "SHARDSIM_LOG_LEVEL", &d.log_level),
        }
    }

    /// Load a YAML file with `GLOBAL_CONFIG` and `SIMILARITY_SEARCH_CONFIG`
    /// sections. When `ROOT_DIRECTORY` is absent, the project is
    /// `{cwd}/{PROJECT_NAME}`; a relative `ROOT_DIRECTORY` is also taken from
    /// the working directory, not from the YAML file's location.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SearchError::NotFound {
                what: "config file",
                path: path.to_path_buf(),
            },
            _ => SearchError::Io(e),
        })?;
        let base = std::env::current_dir()?;
        Self::from_yaml_str(&text, &base)
    }

    /// Parse YAML text; relative roots are resolved against `base`.
    pub fn from_yaml_str(text: &str, base: &Path) -> Result<Self> {
        let file: YamlFile = serde_yaml::from_str(text)
            .map_err(|e| SearchError::Config(format!("invalid YAML config: {e}")))?;
        let g = file.global_config;
        let s = file.similarity_search_config;
        let d = Self::default();

        let root = match g.root_directory {
            Some(r) if r.is_absolute() => r,
            Some(r) => base.join(r),
            None => base.to_path_buf(),
        };
        let block_format = match g.embedding_format {
            Some(name) => name.parse()?,
            None => d.block_format,
        };
        let index_kind = match s.faiss_index_name {
            Some(name) => name.parse()?,
            None => d.index_kind,
        };

        let cfg = Self {
            project_root: root.join(&g.project_name),
            data_directory: g.data_directory,
            checkpoint_directory: g.checkpoint_directory,
            embedding_dim: g.embedding_dimensions,
            block_format,
            index_kind,
            num_clusters: s.num_cluster.unwrap_or(d.num_clusters),
            num_probes: s.num_probes.unwrap_or(d.num_probes),
            nearest_neighbors: s.nearest_neighbors.unwrap_or(d.nearest_neighbors),
            kmeans_iterations: s.kmeans_iterations.unwrap_or(d.kmeans_iterations),
            kmeans_seed: s.kmeans_seed.unwrap_or(d.kmeans_seed),
            max_concurrent_shards: s.max_concurrent_shards.unwrap_or(d.max_concurrent_shards),
            catch_all: s.catch_all.unwrap_or(d.catch_all),
            resolver_scan_limit: s.resolver_scan_limit.unwrap_or(d.resolver_scan_limit),
            resolver_timeout_ms: s.resolver_timeout_ms.unwrap_or(d.resolver_timeout_ms),
            log_level: g.log_level.unwrap_or(d.log_level),
        };
        Ok(cfg)
    }

    /// Reject configurations no query could succeed with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SearchError::Config(msg.to_string()));
        if self.embedding_dim == 0 {
            return fail("embedding_dim must be > 0");
        }
        if self.nearest_neighbors == 0 {
            return fail("nearest_neighbors must be > 0");
        }
        if self.max_concurrent_shards == 0 {
            return fail("max_concurrent_shards must be > 0");
        }
        if self.index_kind == IndexKind::Clustered {
            if self.num_clusters == 0 {
                return fail("num_clusters must be > 0 for a clustered index");
            }
            if self.num_probes == 0 {
                return fail("num_probes must be > 0");
            }
            if self.num_probes > self.num_clusters {
                return Err(SearchError::Config(format!(
                    "num_probes ({}) exceeds num_clusters ({})",
                    self.num_probes, self.num_clusters
                )));
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.project_root.join(&self.data_directory)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.project_root.join(&self.checkpoint_directory)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.checkpoint_dir().join("index")
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }
}

// ── YAML layout ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct YamlFile {
    global_config: YamlGlobal,
    similarity_search_config: YamlSimilarity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct YamlGlobal {
    project_name: String,
    data_directory: String,
    checkpoint_directory: String,
    embedding_dimensions: usize,
    #[serde(default)]
    root_directory: Option<PathBuf>,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    embedding_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
struct YamlSimilarity {
    faiss_index_name: Option<String>,
    num_cluster: Option<usize>,
    num_probes: Option<usize>,
    nearest_neighbors: Option<usize>,
    kmeans_iterations: Option<usize>,
    kmeans_seed: Option<u64>,
    max_concurrent_shards: Option<usize>,
    catch_all: Option<bool>,
    resolver_scan_limit: Option<usize>,
    resolver_timeout_ms: Option<u64>,
}

// ── env helpers ─────────────────────────────────────────────────────────────

fn env_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    get(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_str(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
