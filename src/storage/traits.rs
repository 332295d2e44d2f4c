//! Abstract snapshot backend trait.
//!
//! By using a trait, the authoritative store can run against an in-memory
//! backend for tests and embedded use, or a file backend for durability,
//! without changing its write path.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during snapshot storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend I/O failure.
    #[error("snapshot backend error: {0}")]
    Backend(String),

    /// A stored entry failed checksum or frame validation.
    #[error("snapshot entry corrupt: {0}")]
    Corrupt(String),

    /// Serialization of a collection failed.
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

/// The three durable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    #[allow(missing_docs)]
    Events,
    #[allow(missing_docs)]
    Markets,
    #[allow(missing_docs)]
    Contracts,
}

impl SnapshotKey {
    /// All entries, in durable layout order.
    pub const ALL: [Self; 3] = [Self::Events, Self::Markets, Self::Contracts];

    /// The entry name in the durable layout.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Markets => "markets",
            Self::Contracts => "contracts",
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend for durable snapshot entries.
///
/// Writes replace the whole entry; there is no append path. Implementations
/// must be safe to share across threads.
pub trait SnapshotBackend: Send + Sync {
    /// Reads an entry. `Ok(None)` means the entry was never written.
    fn get(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replaces an entry wholesale.
    fn set(&self, key: SnapshotKey, bytes: &[u8]) -> Result<(), StorageError>;

    /// Deletes an entry. Deleting an absent entry is not an error.
    fn remove(&self, key: SnapshotKey) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_backend_object_safe(_: &dyn SnapshotBackend) {}

    #[test]
    fn snapshot_key_names_match_durable_layout() {
        assert_eq!(SnapshotKey::Events.as_str(), "events");
        assert_eq!(SnapshotKey::Markets.as_str(), "markets");
        assert_eq!(SnapshotKey::Contracts.as_str(), "contracts");
    }
}
