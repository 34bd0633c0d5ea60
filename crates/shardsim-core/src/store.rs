//! Versioned per-shard embedding blocks.
//!
//! A block is one `(N, D)` F32 matrix named [`EMBEDDINGS_DATASET`], stored
//! either as an HDF5 dataset (the training job's output, `hdf5` feature) or
//! as a safetensors tensor. Blocks are immutable once a checkpoint version is
//! published; the store only reads them, except for [`EmbeddingStore::write`]
//! which stages new blocks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1};
use safetensors::{Dtype, SafeTensors};
use tracing::debug;

use crate::atomic::write_atomic;
use crate::config::{BlockFormat, ShardSimConfig};
use crate::error::{Result, SearchError};
use crate::shard::ShardCoord;

/// Name of the dataset (HDF5) or tensor (safetensors) inside every block.
pub const EMBEDDINGS_DATASET: &str = "embeddings";

/// File in the checkpoint directory naming the current version.
pub const VERSION_MARKER_FILE: &str = "checkpoint_version.txt";

/// One shard's embedding matrix for one checkpoint version.
#[derive(Debug, Clone)]
pub struct EmbeddingBlock {
    pub shard: ShardCoord,
    pub version: u64,
    pub matrix: Array2<f32>,
}

impl EmbeddingBlock {
    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn row(&self, i: usize) -> Option<ArrayView1<'_, f32>> {
        (i < self.rows()).then(|| self.matrix.row(i))
    }

    /// Row-major contiguous copy of the whole block.
    pub fn to_flat(&self) -> Vec<f32> {
        self.matrix.iter().copied().collect()
    }
}

/// Read access to the checkpoint directory.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    checkpoint_dir: PathBuf,
    dim: usize,
    format: BlockFormat,
}

impl EmbeddingStore {
    /// HDF5 blocks under `checkpoint_dir`; see [`with_format`](Self::with_format).
    pub fn new(checkpoint_dir: impl Into<PathBuf>, dim: usize) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            dim,
            format: BlockFormat::Hdf5,
        }
    }

    pub fn from_config(config: &ShardSimConfig) -> Self {
        Self::new(config.checkpoint_dir(), config.embedding_dim).with_format(config.block_format)
    }

    pub fn with_format(mut self, format: BlockFormat) -> Self {
        self.format = format;
        self
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn format(&self) -> BlockFormat {
        self.format
    }

    pub fn block_path(&self, shard: &ShardCoord, version: u64) -> PathBuf {
        self.checkpoint_dir
            .join(shard.embedding_file_name(version, self.format))
    }

    pub fn version_marker_path(&self) -> PathBuf {
        self.checkpoint_dir.join(VERSION_MARKER_FILE)
    }

    /// Read the checkpoint version marker. Only the first whitespace-separated
    /// token is significant.
    pub fn current_version(&self) -> Result<u64> {
        let path = self.version_marker_path();
        let bytes = read_required(&path, "version marker")?;
        let text = String::from_utf8_lossy(&bytes);
        let token = text
            .split_whitespace()
            .next()
            .ok_or_else(|| SearchError::format(&path, "version marker is empty"))?;
        let version = token.parse::<u64>().map_err(|_| {
            SearchError::format(&path, format!("'{token}' is not a non-negative integer"))
        })?;
        debug!(version, "checkpoint version");
        Ok(version)
    }

    /// Load the `(N, D)` block for `shard` at `version`.
    pub fn read(&self, shard: &ShardCoord, version: u64) -> Result<EmbeddingBlock> {
        let path = self.block_path(shard, version);
        if !path.is_file() {
            return Err(SearchError::NotFound {
                what: "embedding block",
                path,
            });
        }

        let (rows, cols, values) = match self.format {
            BlockFormat::Hdf5 => hdf5_block::read(&path)?,
            BlockFormat::Safetensors => read_safetensors(&path)?,
        };
        if cols != self.dim {
            return Err(SearchError::format(
                &path,
                format!("vector dimension {cols} differs from configured {}", self.dim),
            ));
        }
        let matrix = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| SearchError::format(&path, e.to_string()))?;

        debug!(shard = %shard, version, rows, format = %self.format, "embedding block loaded");
        Ok(EmbeddingBlock {
            shard: shard.clone(),
            version,
            matrix,
        })
    }

    /// Stage a block for `shard` at `version`. Published atomically.
    pub fn write(&self, shard: &ShardCoord, version: u64, matrix: &Array2<f32>) -> Result<PathBuf> {
        if matrix.ncols() != self.dim {
            return Err(SearchError::DimensionMismatch {
                expected: self.dim,
                got: matrix.ncols(),
            });
        }
        let path = self.block_path(shard, version);
        let values: Vec<f32> = matrix.iter().copied().collect();
        let shape = (matrix.nrows(), matrix.ncols());

        match self.format {
            BlockFormat::Hdf5 => hdf5_block::write(&path, shape, &values)?,
            BlockFormat::Safetensors => write_safetensors(&path, shape, &values)?,
        }
        Ok(path)
    }

    /// Publish `version` as the current checkpoint.
    pub fn write_version(&self, version: u64) -> Result<()> {
        write_atomic(&self.version_marker_path(), format!("{version}\n").as_bytes())
    }
}

fn read_required(path: &Path, what: &'static str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SearchError::NotFound {
            what,
            path: path.to_path_buf(),
        },
        _ => SearchError::Io(e),
    })
}

// ── safetensors ─────────────────────────────────────────────────────────────

fn read_safetensors(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let bytes = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| SearchError::format(path, format!("not a safetensors file: {e}")))?;
    let view = tensors.tensor(EMBEDDINGS_DATASET).map_err(|_| {
        SearchError::format(path, format!("missing dataset '{EMBEDDINGS_DATASET}'"))
    })?;

    if view.dtype() != Dtype::F32 {
        return Err(SearchError::format(
            path,
            format!("expected F32 data, found {:?}", view.dtype()),
        ));
    }
    let (rows, cols) = match view.shape() {
        [rows, cols] => (*rows, *cols),
        other => {
            return Err(SearchError::format(
                path,
                format!("expected a 2-D matrix, found shape {other:?}"),
            ))
        }
    };
    let values = view
        .data()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((rows, cols, values))
}

fn write_safetensors(path: &Path, shape: (usize, usize), values: &[f32]) -> Result<()> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for v in values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    let view = safetensors::tensor::TensorView::new(Dtype::F32, vec![shape.0, shape.1], &raw)
        .map_err(|e| SearchError::format(path, e.to_string()))?;

    let mut tensors = HashMap::new();
    tensors.insert(EMBEDDINGS_DATASET.to_string(), view);
    let bytes = safetensors::serialize(&tensors, &None::<HashMap<String, String>>)
        .map_err(|e| SearchError::format(path, e.to_string()))?;
    write_atomic(path, &bytes)
}

// ── HDF5 ────────────────────────────────────────────────────────────────────

#[cfg(feature = "hdf5")]
mod hdf5_block {
    use std::path::Path;

    use tempfile::NamedTempFile;

    use super::EMBEDDINGS_DATASET;
    use crate::error::{Result, SearchError};

    pub(super) fn read(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
        let bad = |reason: String| SearchError::format(path, reason);

        let file = hdf5::File::open(path).map_err(|e| bad(format!("not an HDF5 file: {e}")))?;
        let ds = file
            .dataset(EMBEDDINGS_DATASET)
            .map_err(|_| bad(format!("missing dataset '{EMBEDDINGS_DATASET}'")))?;

        let dtype = ds.dtype().map_err(|e| bad(e.to_string()))?;
        if !dtype.is::<f32>() {
            return Err(bad("expected F32 data".to_string()));
        }
        let shape = ds.shape();
        let (rows, cols) = match shape.as_slice() {
            [rows, cols] => (*rows, *cols),
            other => return Err(bad(format!("expected a 2-D matrix, found shape {other:?}"))),
        };
        let values = ds.read_raw::<f32>().map_err(|e| bad(e.to_string()))?;
        Ok((rows, cols, values))
    }

    /// Written to a temp file beside `path`, then renamed over it.
    pub(super) fn write(path: &Path, shape: (usize, usize), values: &[f32]) -> Result<()> {
        let bad = |e: hdf5::Error| SearchError::format(path, e.to_string());
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        let tmp = NamedTempFile::new_in(parent)?;

        {
            let file = hdf5::File::create(tmp.path()).map_err(bad)?;
            let ds = file
                .new_dataset::<f32>()
                .shape([shape.0, shape.1])
                .create(EMBEDDINGS_DATASET)
                .map_err(bad)?;
            ds.write_raw(values).map_err(bad)?;
            drop(ds);
            file.close().map_err(bad)?;
        }
        tmp.persist(path).map_err(|e| SearchError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(not(feature = "hdf5"))]
mod hdf5_block {
    use std::path::Path;

    use crate::error::{Result, SearchError};

    const DISABLED: &str =
        "HDF5 blocks need the `hdf5` feature; rebuild with it or set block_format to safetensors";

    pub(super) fn read(_path: &Path) -> Result<(usize, usize, Vec<f32>)> {
        Err(SearchError::Config(DISABLED.to_string()))
    }

    pub(super) fn write(_path: &Path, _shape: (usize, usize), _values: &[f32]) -> Result<()> {
        Err(SearchError::Config(DISABLED.to_string()))
    }
}
