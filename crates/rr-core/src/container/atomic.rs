//! Atomic file placement
//!
//! 1. Write to a temporary file in the destination's directory
//! 2. Sync the file to disk
//! 3. Rename the temporary file onto the destination
//!
//! The destination is never left partially written. If the write step fails
//! the temporary file is removed and the destination is untouched.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::error::{EngineError, EngineResult};
use crate::storage::StorageError;

/// How the finished file is moved onto the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Replace whatever is at the destination
    Replace,
    /// Fail with `DestinationExists` if the destination exists
    NoClobber,
}

/// Write `path` atomically using `write` to fill the temporary file
pub fn write_atomically<F>(path: &Path, placement: Placement, write: F) -> EngineResult<()>
where
    F: FnOnce(&mut File) -> EngineResult<()>,
{
    let mut temp = temp_sibling(path)?;

    write(temp.as_file_mut())?;

    temp.as_file()
        .sync_all()
        .map_err(|e| StorageError::from_io(e, temp.path().to_path_buf()))?;

    let temp_path = temp.path().to_path_buf();
    let persisted = match placement {
        Placement::Replace => temp.persist(path),
        Placement::NoClobber => temp.persist_noclobber(path),
    };

    match persisted {
        Ok(_) => Ok(()),
        Err(err) if placement == Placement::NoClobber
            && err.error.kind() == io::ErrorKind::AlreadyExists =>
        {
            Err(EngineError::DestinationExists {
                path: path.to_path_buf(),
            })
        }
        Err(err) => Err(StorageError::AtomicWriteFailed {
            from: temp_path,
            to: path.to_path_buf(),
            source: err.error,
        }
        .into()),
    }
}

/// Create the temporary file next to `path` so the final rename stays on one filesystem
fn temp_sibling(path: &Path) -> EngineResult<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());

    Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| StorageError::from_io(e, parent).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn test_replace_writes_new_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("paper.rr");
        fs::write(&path, b"old").unwrap();

        write_atomically(&path, Placement::Replace, |file| {
            file.write_all(b"new").map_err(|e| StorageError::from(e).into())
        })
        .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(leftover_temp_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_failed_write_leaves_destination_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("paper.rr");
        fs::write(&path, b"original").unwrap();

        let result = write_atomically(&path, Placement::Replace, |file| {
            file.write_all(b"half of the new archi").unwrap();
            Err(StorageError::from(io::Error::new(io::ErrorKind::Other, "simulated crash")).into())
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"original");
        assert_eq!(leftover_temp_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_no_clobber_refuses_existing_destination() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("paper.rr");
        fs::write(&path, b"keep me").unwrap();

        let err = write_atomically(&path, Placement::NoClobber, |file| {
            file.write_all(b"intruder").map_err(|e| StorageError::from(e).into())
        })
        .unwrap_err();

        assert!(matches!(err, EngineError::DestinationExists { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
        assert_eq!(leftover_temp_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_no_clobber_creates_missing_destination() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fresh.rr");

        write_atomically(&path, Placement::NoClobber, |file| {
            file.write_all(b"fresh").map_err(|e| StorageError::from(e).into())
        })
        .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"fresh");
    }
}
