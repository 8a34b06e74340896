//! Payload Compression
//!
//! LZ4 block compression for entry payloads and backup snapshots. Payloads
//! are only kept compressed when that actually saves space.

use bytes::Bytes;

use crate::error::{CacheError, Result};

// == Compress ==
/// Compresses `data` into a size-prefixed LZ4 block.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    lz4::block::compress(data, Some(lz4::block::CompressionMode::DEFAULT), true)
        .map_err(|e| CacheError::Serialization(format!("lz4 compression failed: {}", e)))
}

// == Decompress ==
/// Inverse of [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4::block::decompress(data, None)
        .map_err(|e| CacheError::Serialization(format!("lz4 decompression failed: {}", e)))
}

// == Maybe Compress ==
/// Compresses `data` when it is at least `threshold` bytes and the result
/// is smaller than the input.
///
/// Returns the bytes to store and whether they are compressed.
pub fn maybe_compress(data: Bytes, threshold: usize) -> Result<(Bytes, bool)> {
    if data.len() < threshold {
        return Ok((data, false));
    }
    let compressed = compress(&data)?;
    if compressed.len() < data.len() {
        Ok((Bytes::from(compressed), true))
    } else {
        Ok((data, false))
    }
}

/// Returns the logical payload of a stored value.
pub fn expand(stored: &Bytes, compressed: bool) -> Result<Bytes> {
    if compressed {
        decompress(stored).map(Bytes::from)
    } else {
        Ok(stored.clone())
    }
}
