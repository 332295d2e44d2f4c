//! Checksummed framing for snapshot entries.
//!
//! Every entry is serialized as:
//! - JSON for data (compatible with the entity serde attributes)
//! - Magic bytes and a version byte for identification
//! - Length prefix for framing
//! - CRC32 checksum for corruption detection

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use super::traits::StorageError;

/// Current frame version.
const FRAME_VERSION: u8 = 1;

/// Magic bytes identifying oddsync snapshot entries.
pub const MAGIC: [u8; 4] = *b"ODSY";

/// Sanity cap on entry size (16 MiB); a betting hierarchy snapshot is tiny.
const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// Serializes a value to a checksummed frame.
///
/// Format:
/// ```text
/// [magic: 4 bytes][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let data = serde_json::to_vec(value)
        .map_err(|e| StorageError::Serialization(format!("serialization failed: {e}")))?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;

    let mut out = Vec::with_capacity(4 + 1 + 4 + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(FRAME_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());

    Ok(out)
}

/// Deserializes a value from a checksummed frame.
///
/// # Errors
/// - `Corrupt` if the magic, version, length, or checksum do not hold up
/// - `Serialization` if the JSON payload fails to deserialize
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt(reason);

    if bytes.len() < 4 + 1 + 4 + 4 {
        return Err(corrupt(format!("frame too short: {} bytes", bytes.len())));
    }

    if bytes[..4] != MAGIC {
        return Err(corrupt(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {:?}",
            &bytes[..4]
        )));
    }

    let version = bytes[4];
    if version != FRAME_VERSION {
        return Err(corrupt(format!(
            "unsupported frame version: {version} (expected {FRAME_VERSION})"
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[5..9]);
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_ENTRY_SIZE {
        return Err(corrupt(format!(
            "entry size {len} exceeds maximum {MAX_ENTRY_SIZE}"
        )));
    }
    if bytes.len() != 4 + 1 + 4 + len + 4 {
        return Err(corrupt(format!(
            "frame length mismatch: header says {len} data bytes, frame has {}",
            bytes.len()
        )));
    }

    let data = &bytes[9..9 + len];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[9 + len..]);
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(data);
    let computed_crc = hasher.finalize();

    if stored_crc != computed_crc {
        return Err(corrupt(format!(
            "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x}"
        )));
    }

    serde_json::from_slice(data)
        .map_err(|e| StorageError::Serialization(format!("deserialization failed: {e}")))
}
