//! Durable snapshot storage.
//!
//! The durable layout is three flat key-value entries (`events`, `markets`,
//! `contracts`), each holding the whole collection, rewritten wholesale on
//! every mutation that touches it. Backends only move bytes; framing and
//! corruption detection live in [`codec`].

/// Checksummed JSON framing.
pub mod codec;
/// File-per-entry backend.
mod file;
/// In-memory backend for tests and embedded use.
mod memory;
/// Backend trait and storage errors.
mod traits;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use traits::{SnapshotBackend, SnapshotKey, StorageError};
