//! World index and gate table loading
//!
//! Both files are JSON produced by the world export tooling. They are parsed
//! once at init and immutable afterwards; malformed entries are skipped with
//! a warning rather than failing the whole load.

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::error::Error;
use crate::world::gates::{GateRecord, GateTable, jenkins_hash};
use crate::world::grid::{ChunkGrid, ChunkKey};

/// Payload file names for one chunk
#[derive(Clone, Debug, Deserialize)]
pub struct ChunkMeta {
    /// Newline-delimited JSON payload
    pub file: String,
    /// Optional binary payload with the same entities, positions only
    #[serde(default)]
    pub bin: Option<String>,
}

/// The immutable world index
#[derive(Clone, Debug)]
pub struct WorldIndex {
    pub chunk_size: f32,
    pub min_z: f32,
    pub max_z: f32,
    /// Directory (or URL prefix) the chunk files live under
    pub chunks_dir: String,
    pub chunks: HashMap<ChunkKey, ChunkMeta>,
}

#[derive(Deserialize)]
struct RawBounds {
    min_z: f32,
    max_z: f32,
}

#[derive(Deserialize)]
struct RawIndex {
    chunk_size: f32,
    bounds: RawBounds,
    #[serde(default)]
    chunks_dir: String,
    chunks: HashMap<String, ChunkMeta>,
}

impl WorldIndex {
    /// Parse the index from its JSON text
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let raw: RawIndex = serde_json::from_str(text)
            .map_err(|e| Error::Index(format!("malformed index: {e}")))?;

        if !raw.chunk_size.is_finite() || raw.chunk_size <= 0.0 {
            return Err(Error::Index(format!("bad chunk_size {}", raw.chunk_size)));
        }
        if !raw.bounds.min_z.is_finite() || !raw.bounds.max_z.is_finite() {
            return Err(Error::Index("non-finite z bounds".into()));
        }

        let mut chunks = HashMap::with_capacity(raw.chunks.len());
        for (name, meta) in raw.chunks {
            match ChunkKey::parse(&name) {
                Some(key) => {
                    chunks.insert(key, meta);
                }
                None => log::warn!("skipping unparseable chunk key {name:?}"),
            }
        }

        Ok(Self {
            chunk_size: raw.chunk_size,
            min_z: raw.bounds.min_z,
            max_z: raw.bounds.max_z,
            chunks_dir: raw.chunks_dir,
            chunks,
        })
    }

    /// The grid this index partitions the world into
    pub fn grid(&self) -> ChunkGrid {
        ChunkGrid::new(self.chunk_size, self.min_z, self.max_z)
    }

    /// Path of a chunk payload file relative to the fetcher root
    pub fn chunk_path(&self, file: &str) -> String {
        if self.chunks_dir.is_empty() {
            file.to_string()
        } else {
            format!("{}/{}", self.chunks_dir.trim_end_matches('/'), file)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWeather {
    Hash(u32),
    Name(String),
}

#[derive(Deserialize)]
struct RawGateRecord {
    #[serde(rename = "hoursOnOff", default)]
    hours_on_off: Option<u32>,
    #[serde(rename = "weatherTypes", default)]
    weather_types: Vec<RawWeather>,
}

#[derive(Deserialize)]
struct RawGateFile {
    #[serde(rename = "byYmapHash", default)]
    by_hash: HashMap<String, RawGateRecord>,
}

/// Parse the optional gate table from its JSON text
///
/// Keys are decimal archetype hashes; weather entries may be hashes or names
/// (names are hashed on their lowercased form).
pub fn gate_table_from_json(text: &str) -> Result<GateTable, Error> {
    let raw: RawGateFile = serde_json::from_str(text)
        .map_err(|e| Error::Index(format!("malformed gate table: {e}")))?;

    let mut table = GateTable::with_capacity(raw.by_hash.len());
    for (name, record) in raw.by_hash {
        let Ok(hash) = name.trim().parse::<u32>() else {
            log::warn!("skipping unparseable gate key {name:?}");
            continue;
        };
        let weathers = record
            .weather_types
            .into_iter()
            .map(|w| match w {
                RawWeather::Hash(h) => h,
                RawWeather::Name(n) => jenkins_hash(&n),
            })
            .collect();
        table.insert(
            hash,
            GateRecord {
                // hours are a 24-bit mask; stray high bits would block every hour
                hours_mask: record.hours_on_off.unwrap_or(0) & 0x00FF_FFFF,
                weathers,
            },
        );
    }
    Ok(table)
}
