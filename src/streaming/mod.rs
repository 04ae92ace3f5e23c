//! Chunk streaming: want-set selection, fetch pipeline, residency control

pub mod config;
pub mod fetch;
pub mod parse;
pub mod streamer;
pub mod want;

pub use config::StreamerConfig;
pub use fetch::{AssetFetcher, CancelFlag, FetchError, FetchOptions, FsFetcher, Priority};
pub use streamer::{ChunkSink, StreamStats, WorldStreamer};
pub use want::WantSet;
