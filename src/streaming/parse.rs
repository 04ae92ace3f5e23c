//! Chunk payload decoding
//!
//! Payloads come in two formats: an optional packed binary file holding
//! positions only, and the newline-delimited JSON fallback carrying full
//! entity records. Both decode into a flat `x, y, z, x, y, z, ...` array.

use serde::Deserialize;
use thiserror::Error;

/// Magic tag of the packed binary payload
pub const BINARY_MAGIC: [u8; 4] = *b"ENT0";

/// Header: magic tag + little-endian entity count
pub const BINARY_HEADER_LEN: usize = 8;

/// Rejection reasons for a binary payload (callers fall back to text)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BinaryPayloadError {
    #[error("shorter than header")]
    TruncatedHeader,

    #[error("bad magic")]
    BadMagic,

    #[error("{got} bytes but {need} needed for {count} entities")]
    TruncatedBody { count: u32, need: usize, got: usize },
}

/// Decode a packed binary payload into position triples
///
/// Layout: `"ENT0"`, `count: u32` little-endian, then `count * 3` f32
/// components, little-endian. A zero count is a legal empty payload.
pub fn decode_binary(bytes: &[u8]) -> Result<Vec<f32>, BinaryPayloadError> {
    if bytes.len() < BINARY_HEADER_LEN {
        return Err(BinaryPayloadError::TruncatedHeader);
    }
    if bytes[0..4] != BINARY_MAGIC {
        return Err(BinaryPayloadError::BadMagic);
    }
    let count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    let need = BINARY_HEADER_LEN as u64 + count as u64 * 12;
    if (bytes.len() as u64) < need {
        return Err(BinaryPayloadError::TruncatedBody {
            count,
            need: need as usize,
            got: bytes.len(),
        });
    }

    let body = &bytes[BINARY_HEADER_LEN..need as usize];
    let mut triples = Vec::with_capacity(count as usize * 3);
    for c in body.chunks_exact(4) {
        triples.push(f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    }
    Ok(triples)
}

/// One entity placement decoded from a payload line
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityPlacement {
    pub position: [f32; 3],
    /// Zero means ungated
    pub archetype_hash: u32,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    position: Option<Vec<f64>>,
    // The export tooling has used several names for the same field over time
    #[serde(
        default,
        alias = "ymap_hash",
        alias = "ymapHash",
        alias = "ymap_hash32"
    )]
    archetype_hash: Option<u32>,
}

/// Decode one NDJSON payload line
///
/// Returns `None` for blank lines, malformed JSON, missing or short
/// positions, and non-finite coordinates; unknown fields are ignored.
pub fn decode_entity(line: &str) -> Option<EntityPlacement> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let raw: RawEntity = serde_json::from_str(line).ok()?;
    let pos = raw.position?;
    if pos.len() < 3 {
        return None;
    }
    let position = [pos[0] as f32, pos[1] as f32, pos[2] as f32];
    if !position.iter().all(|c| c.is_finite()) {
        return None;
    }
    Some(EntityPlacement {
        position,
        archetype_hash: raw.archetype_hash.unwrap_or(0),
    })
}
