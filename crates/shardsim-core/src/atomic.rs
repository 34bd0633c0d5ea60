//! Write-then-rename publishing for on-disk artifacts.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, SearchError};

/// Write `bytes` to `path` so that readers never observe a partial file.
///
/// The content goes to a temporary file in the destination directory and is
/// then renamed over `path`. Concurrent writers of the same path race on the
/// rename; the last one wins.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SearchError::Io(e.error))?;
    Ok(())
}
