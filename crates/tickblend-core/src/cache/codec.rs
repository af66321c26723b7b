//! Cache value encoding.
//!
//! Values are stored as UTF-8 JSON. Payloads larger than the threshold are
//! zlib-compressed and prefixed with [`COMPRESSION_MARKER`], so a reader can
//! tell the two forms apart from the bytes alone.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::CacheError;

pub const COMPRESSION_MARKER: &[u8] = b"COMPRESSED:";

/// Serialized size above which payloads are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Serializes `value` to JSON and compresses it when it exceeds `threshold` bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T, threshold: usize) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(value).map_err(|error| CacheError::Encode(error.to_string()))?;
    pack(json, threshold)
}

/// Applies the compression envelope to already-serialized bytes.
pub fn pack(bytes: Vec<u8>, threshold: usize) -> Result<Vec<u8>, CacheError> {
    if bytes.len() <= threshold {
        return Ok(bytes);
    }

    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(COMPRESSION_MARKER.len() + bytes.len() / 2),
        Compression::default(),
    );
    encoder
        .write_all(&bytes)
        .map_err(|error| CacheError::Encode(error.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|error| CacheError::Encode(error.to_string()))?;

    let mut tagged = Vec::with_capacity(COMPRESSION_MARKER.len() + compressed.len());
    tagged.extend_from_slice(COMPRESSION_MARKER);
    tagged.extend_from_slice(&compressed);
    Ok(tagged)
}

/// Removes the compression envelope, returning the serialized bytes.
pub fn unpack(stored: &[u8]) -> Result<Vec<u8>, CacheError> {
    match stored.strip_prefix(COMPRESSION_MARKER) {
        Some(compressed) => inflate(compressed),
        None => Ok(stored.to_vec()),
    }
}

/// Decodes a stored value.
///
/// Tries the canonical JSON form first, then falls back to treating the bytes
/// as an untagged zlib stream written by an older encoder.
pub fn decode<T: DeserializeOwned>(stored: &[u8]) -> Result<T, CacheError> {
    let bytes = unpack(stored)?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(json_error) => {
            let inflated = inflate(&bytes).map_err(|_| CacheError::Decode(json_error.to_string()))?;
            serde_json::from_slice(&inflated).map_err(|error| CacheError::Decode(error.to_string()))
        }
    }
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|error| CacheError::Decode(format!("corrupt compressed payload: {error}")))?;
    Ok(out)
}
