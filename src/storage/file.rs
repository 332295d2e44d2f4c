//! File-backed snapshot backend.
//!
//! One file per durable entry (`events.snap`, `markets.snap`,
//! `contracts.snap`) inside a data directory. Writes go through a
//! temporary file and an atomic rename, so a crash mid-write leaves the
//! previous entry intact; torn writes are caught by the frame checksum on
//! load.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::traits::{SnapshotBackend, SnapshotKey, StorageError};

fn io_err(context: &str, e: &std::io::Error) -> StorageError {
    StorageError::Backend(format!("{context}: {e}"))
}

/// Snapshot backend storing one frame file per entry.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (creating if necessary) a data directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_err("failed to create data directory", &e))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: SnapshotKey) -> PathBuf {
        self.dir.join(format!("{}.snap", key.as_str()))
    }
}

impl SnapshotBackend for FileBackend {
    fn get(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("failed to read snapshot entry", &e)),
        }
    }

    fn set(&self, key: SnapshotKey, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!("{}.snap.tmp", key.as_str()));

        fs::write(&tmp, bytes).map_err(|e| io_err("failed to write snapshot entry", &e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err("failed to commit snapshot entry", &e))?;
        Ok(())
    }

    fn remove(&self, key: SnapshotKey) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("failed to remove snapshot entry", &e)),
        }
    }
}
