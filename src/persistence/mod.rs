//! Disk persistence for reducers and forests.
//!
//! Both artifacts use a small hand-written little-endian format with a CRC32
//! footer (see [`format`]). Writes go to a temporary file in the destination
//! directory, are fsynced, then renamed over the target, so a crash never
//! leaves a half-written artifact under the final name.

mod codec;
pub mod format;
mod forest;
mod reducer;

pub use format::{IndexManifest, FORMAT_VERSION};
pub use forest::{forest_from_bytes, forest_to_bytes, load_forest, save_forest};
pub use reducer::{load_reducer, reducer_from_bytes, reducer_to_bytes, save_reducer};

use crate::error::{Result, SearchError};
use std::io::Write;
use std::path::Path;

/// Replace `path` with `bytes` atomically.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SearchError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        std::fs::write(&path, b"old contents that are longer").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");

        // No temporary files left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn atomic_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("artifact.bin");
        assert!(matches!(atomic_write(&path, b"x"), Err(SearchError::Io(_))));
    }
}
