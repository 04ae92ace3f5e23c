//! Demo: synthesize a small world on disk and stream it with a moving camera

use std::fs;
use std::path::Path;
use std::sync::Arc;

use glam::Vec3;

use gridstream::core::CameraPose;
use gridstream::streaming::{ChunkSink, FsFetcher, StreamerConfig, WorldStreamer};
use gridstream::world::ChunkKey;

const CHUNK_SIZE: f32 = 256.0;
const WORLD_RADIUS: i32 = 8;

struct LogSink {
    resident: usize,
    entities: usize,
}

impl ChunkSink for LogSink {
    fn admit(&mut self, key: ChunkKey, triples: &[f32]) {
        self.resident += 1;
        self.entities += triples.len() / 3;
        log::info!("admit {key}: {} entities ({} resident)", triples.len() / 3, self.resident);
    }

    fn evict(&mut self, key: ChunkKey) {
        self.resident -= 1;
        log::info!("evict {key} ({} resident)", self.resident);
    }
}

/// Write an index and one NDJSON payload per chunk
fn generate_world(root: &Path) -> std::io::Result<()> {
    let chunks_dir = root.join("chunks");
    fs::create_dir_all(&chunks_dir)?;

    let mut chunk_entries = Vec::new();
    for sy in -WORLD_RADIUS..=WORLD_RADIUS {
        for sx in -WORLD_RADIUS..=WORLD_RADIUS {
            let key = ChunkKey::new(sx, sy);
            let mut lines = String::new();
            for i in 0..16 {
                let x = (sx as f32 + (i % 4) as f32 / 4.0) * CHUNK_SIZE;
                let y = (sy as f32 + (i / 4) as f32 / 4.0) * CHUNK_SIZE;
                lines.push_str(&format!(
                    "{{\"position\":[{x},{y},{}],\"archetype_hash\":{}}}\n",
                    (i as f32) * 0.5,
                    i * 31,
                ));
            }
            fs::write(chunks_dir.join(format!("{key}.ndjson")), lines)?;
            chunk_entries.push(format!("\"{key}\": {{\"file\": \"{key}.ndjson\"}}"));
        }
    }

    let index = format!(
        "{{\"chunk_size\": {CHUNK_SIZE}, \"bounds\": {{\"min_z\": -50.0, \"max_z\": 200.0}}, \
         \"chunks_dir\": \"chunks\", \"chunks\": {{{}}}}}",
        chunk_entries.join(", ")
    );
    fs::write(root.join("index.json"), index)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    gridstream::core::logging::init();

    let root = std::env::temp_dir().join("gridstream_demo_world");
    if let Err(e) = generate_world(&root) {
        log::error!("world generation failed: {e}");
        return;
    }
    log::info!("world generated under {}", root.display());

    let fetcher = Arc::new(FsFetcher::new(&root, 8));
    let config = StreamerConfig {
        radius_chunks: 3,
        max_loaded_chunks: 30,
        ..Default::default()
    };
    let mut streamer = WorldStreamer::new_with_current_runtime(fetcher, config);
    if let Err(e) = streamer.init("index.json", None).await {
        log::error!("init failed: {e}");
        return;
    }

    let mut sink = LogSink { resident: 0, entities: 0 };

    // Fly across the world along +X
    for tick in 0..120 {
        let x = -1500.0 + tick as f32 * 30.0;
        let position = Vec3::new(x, 0.0, 120.0);
        let camera = CameraPose::look_at(position, position + Vec3::new(1.0, 0.0, -0.2));
        streamer.update(&camera, &mut sink);
        tokio::time::sleep(std::time::Duration::from_millis(16)).await;
    }

    // Let the tail of in-flight fetches finish
    for _ in 0..20 {
        let position = Vec3::new(2100.0, 0.0, 120.0);
        let camera = CameraPose::look_at(position, position + Vec3::new(1.0, 0.0, -0.2));
        streamer.update(&camera, &mut sink);
        tokio::time::sleep(std::time::Duration::from_millis(16)).await;
    }

    let stats = streamer.stats();
    log::info!(
        "done: started {} loaded {} aborted {} failed {} ({} chunks resident, {} entities seen)",
        stats.started,
        stats.loaded,
        stats.aborted,
        stats.failed,
        sink.resident,
        sink.entities,
    );

    let _ = fs::remove_dir_all(&root);
}
