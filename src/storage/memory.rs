//! In-memory snapshot backend.
//!
//! Thread-safe, intended for tests and embedded use. Entries live in a
//! plain map behind an `RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use super::traits::{SnapshotBackend, SnapshotKey, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory snapshot backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<SnapshotKey, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn get(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("memory.get"))?;
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: SnapshotKey, bytes: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("memory.set"))?;
        entries.insert(key, bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: SnapshotKey) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("memory.remove"))?;
        entries.remove(&key);
        Ok(())
    }
}
