//! On-camera persisted-configuration block codec.
//!
//! Cameras expose one fixed-capacity storage block holding a JSON parameter
//! dump. Layout, all fields little-endian:
//!
//! ```text
//! [4-byte CRC32][4-byte encoding tag][4-byte payload length][payload...]
//! ```
//!
//! Two generations exist in the field. Legacy firmware wrote the JSON text
//! raw, starting right after the CRC; current firmware Huffman-compresses
//! it and fills in the tag and length. Reading tries the legacy form first
//! (CRC over the text and a successful JSON parse identify it), then the
//! framed form. Writing always produces the framed, compressed form with a
//! freshly derived CRC.

pub mod huffman;

use thiserror::Error;

/// Hard cap on the storage block, matching the device firmware.
pub const MAX_STORAGE_SIZE: usize = 10 * 1024 * 1024;

const HEADER_LEN: usize = 12;
const ENCODING_HUFFMAN: u32 = 0;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage block is empty")]
    Empty,

    #[error("block of {0} bytes is too short to carry a header")]
    Truncated(usize),

    #[error("crc mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("unknown encoding tag {0}")]
    UnknownEncoding(u32),

    #[error("payload length {0} exceeds the block")]
    BadLength(usize),

    #[error("block capacity {capacity} cannot hold {needed} bytes")]
    BlockTooSmall { needed: usize, capacity: usize },

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("corrupt payload: {0}")]
    Corrupt(String),
}

/// Decode a storage block into its JSON text.
pub fn read_block(block: &[u8]) -> Result<String, StorageError> {
    if block.len() < HEADER_LEN {
        return Err(StorageError::Truncated(block.len()));
    }
    let stored_crc = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    if stored_crc == 0 || stored_crc == 0xFFFF_FFFF {
        return Err(StorageError::Empty);
    }

    // Legacy form: raw NUL-terminated JSON straight after the CRC.
    let tail = &block[4..];
    let text_end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    let text = &tail[..text_end];
    if crc32fast::hash(text) == stored_crc {
        if let Ok(json) = std::str::from_utf8(text) {
            if serde_json::from_str::<serde_json::Value>(json).is_ok() {
                return Ok(json.to_string());
            }
        }
    }

    // Framed form: tag + length + compressed payload.
    let tag = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    if tag != ENCODING_HUFFMAN {
        return Err(StorageError::UnknownEncoding(tag));
    }
    let payload_len = u32::from_le_bytes([block[8], block[9], block[10], block[11]]) as usize;
    if payload_len > block.len() - HEADER_LEN || payload_len > MAX_STORAGE_SIZE - HEADER_LEN {
        return Err(StorageError::BadLength(payload_len));
    }
    let payload = &block[HEADER_LEN..HEADER_LEN + payload_len];
    let computed = crc32fast::hash(payload);
    if computed != stored_crc {
        return Err(StorageError::CrcMismatch { stored: stored_crc, computed });
    }

    let raw = huffman::decompress(payload)?;
    let json = String::from_utf8(raw)
        .map_err(|e| StorageError::Corrupt(format!("payload is not UTF-8: {e}")))?;
    serde_json::from_str::<serde_json::Value>(&json)
        .map_err(|e| StorageError::InvalidJson(e.to_string()))?;
    Ok(json)
}

/// Encode JSON text into a block of exactly `capacity` bytes, zero-padded.
pub fn write_block(json: &str, capacity: usize) -> Result<Vec<u8>, StorageError> {
    serde_json::from_str::<serde_json::Value>(json)
        .map_err(|e| StorageError::InvalidJson(e.to_string()))?;

    let payload = huffman::compress(json.as_bytes());
    let needed = payload.len() + HEADER_LEN;
    if capacity < needed || capacity > MAX_STORAGE_SIZE {
        return Err(StorageError::BlockTooSmall { needed, capacity });
    }

    let mut block = vec![0u8; capacity];
    block[0..4].copy_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    block[4..8].copy_from_slice(&ENCODING_HUFFMAN.to_le_bytes());
    block[8..12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    block[HEADER_LEN..needed].copy_from_slice(&payload);
    Ok(block)
}

/// A cleared block: all zeros, read back as [`StorageError::Empty`].
pub fn clear_block(capacity: usize) -> Vec<u8> {
    vec![0u8; capacity]
}
