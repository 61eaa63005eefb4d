//! Frame blob encoding.
//!
//! A blob is the JSON document `{"data": ..., "metadata": {...}}` compressed
//! as a whole with gzip. Archived blobs depend on both the field names and
//! the serialize-then-compress order, so neither may change.

use crate::frame::Frame;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

/// Serialize a frame to its uncompressed JSON form.
pub fn encode_json<D: Serialize>(frame: &Frame<D>) -> crate::Result<Vec<u8>> {
    serde_json::to_vec(frame).map_err(|e| crate::Error::Serialization(e.to_string()))
}

/// Parse a frame from its uncompressed JSON form.
pub fn decode_json<D: DeserializeOwned>(json: &[u8]) -> crate::Result<Frame<D>> {
    serde_json::from_slice(json)
        .map_err(|e| crate::Error::CorruptPayload(format!("malformed frame document: {e}")))
}

/// Encode a frame into a gzip-compressed JSON blob.
pub fn encode<D: Serialize>(frame: &Frame<D>) -> crate::Result<Vec<u8>> {
    let json = encode_json(frame)?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| crate::Error::Serialization(format!("gzip compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| crate::Error::Serialization(format!("gzip compression failed: {e}")))
}

/// Decode a frame from a gzip-compressed JSON blob.
pub fn decode<D: DeserializeOwned>(blob: &[u8]) -> crate::Result<Frame<D>> {
    if blob.is_empty() {
        return Err(crate::Error::CorruptPayload("empty blob".to_string()));
    }

    let mut json = Vec::new();
    GzDecoder::new(blob)
        .read_to_end(&mut json)
        .map_err(|e| crate::Error::CorruptPayload(format!("gzip decompression failed: {e}")))?;

    decode_json(&json)
}
