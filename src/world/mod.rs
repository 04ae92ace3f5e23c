//! World index, chunk grid, and availability gates

pub mod gates;
pub mod grid;
pub mod index;

pub use gates::{GateEvaluator, GateRecord, GateTable, jenkins_hash};
pub use grid::{ChunkGrid, ChunkKey};
pub use index::{ChunkMeta, WorldIndex};
