//! Chunk keys and the fixed XY grid they live on

use std::fmt;

use crate::core::types::Vec3;
use crate::math::Aabb;

/// Grid coordinate of a chunk in the world's XY plane
///
/// The textual form is `"{sx}_{sy}"`, matching the keys of the world index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub sx: i32,
    pub sy: i32,
}

impl ChunkKey {
    pub fn new(sx: i32, sy: i32) -> Self {
        Self { sx, sy }
    }

    /// Parse the `"{sx}_{sy}"` textual form
    pub fn parse(s: &str) -> Option<Self> {
        let (sx, sy) = s.split_once('_')?;
        Some(Self {
            sx: sx.trim().parse().ok()?,
            sy: sy.trim().parse().ok()?,
        })
    }

    /// Squared grid-index distance to another key
    pub fn distance_sq(&self, other: ChunkKey) -> i64 {
        let dx = (self.sx - other.sx) as i64;
        let dy = (self.sy - other.sy) as i64;
        dx * dx + dy * dy
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sx, self.sy)
    }
}

/// Pure mapping between chunk keys and data-space geometry
///
/// Chunks are square cells of side `chunk_size` in the XY plane, extended
/// over `[min_z, max_z]` vertically.
#[derive(Clone, Copy, Debug)]
pub struct ChunkGrid {
    pub chunk_size: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl ChunkGrid {
    pub fn new(chunk_size: f32, min_z: f32, max_z: f32) -> Self {
        Self { chunk_size, min_z, max_z }
    }

    /// Key of the chunk containing a data-space position
    pub fn key_of(&self, pos: Vec3) -> ChunkKey {
        ChunkKey {
            sx: (pos.x / self.chunk_size).floor() as i32,
            sy: (pos.y / self.chunk_size).floor() as i32,
        }
    }

    /// Data-space bounding box of a chunk
    pub fn aabb_of(&self, key: ChunkKey) -> Aabb {
        let s = self.chunk_size;
        Aabb::new(
            Vec3::new(key.sx as f32 * s, key.sy as f32 * s, self.min_z),
            Vec3::new((key.sx + 1) as f32 * s, (key.sy + 1) as f32 * s, self.max_z),
        )
    }

    /// Data-space center of a chunk (at z = 0)
    pub fn center_of(&self, key: ChunkKey) -> Vec3 {
        let s = self.chunk_size;
        Vec3::new(
            (key.sx as f32 + 0.5) * s,
            (key.sy as f32 + 0.5) * s,
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_parse() {
        let key = ChunkKey::new(-3, 12);
        assert_eq!(key.to_string(), "-3_12");
        assert_eq!(ChunkKey::parse("-3_12"), Some(key));
        assert_eq!(ChunkKey::parse("0_0"), Some(ChunkKey::new(0, 0)));
        assert_eq!(ChunkKey::parse("nope"), None);
        assert_eq!(ChunkKey::parse("1_x"), None);
    }

    #[test]
    fn test_key_of_floors_negative_positions() {
        let grid = ChunkGrid::new(512.0, -100.0, 100.0);
        assert_eq!(grid.key_of(Vec3::new(10.0, 10.0, 10.0)), ChunkKey::new(0, 0));
        assert_eq!(grid.key_of(Vec3::new(-0.5, 0.0, 0.0)), ChunkKey::new(-1, 0));
        assert_eq!(grid.key_of(Vec3::new(512.0, -1.0, 0.0)), ChunkKey::new(1, -1));
    }

    #[test]
    fn test_aabb_of() {
        let grid = ChunkGrid::new(512.0, -100.0, 100.0);
        let aabb = grid.aabb_of(ChunkKey::new(1, -1));
        assert_eq!(aabb.min, Vec3::new(512.0, -512.0, -100.0));
        assert_eq!(aabb.max, Vec3::new(1024.0, 0.0, 100.0));
    }

    #[test]
    fn test_center_of() {
        let grid = ChunkGrid::new(100.0, -10.0, 10.0);
        assert_eq!(grid.center_of(ChunkKey::new(0, 0)), Vec3::new(50.0, 50.0, 0.0));
        assert_eq!(grid.center_of(ChunkKey::new(-1, 2)), Vec3::new(-50.0, 250.0, 0.0));
    }

    #[test]
    fn test_distance_sq() {
        let a = ChunkKey::new(-1, 0);
        assert_eq!(a.distance_sq(ChunkKey::new(3, 0)), 16);
        assert_eq!(a.distance_sq(a), 0);
    }
}
