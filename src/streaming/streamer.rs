//! The streaming facade: residency control and the fetch pipeline driver
//!
//! One `WorldStreamer` is driven by a single logical thread calling
//! [`WorldStreamer::update`] once per tick. Fetches run as background tasks
//! that report through an unbounded channel; the driver drains it
//! non-blockingly at the start of every tick, so all state mutation and all
//! sink calls happen on the driver.
//!
//! Every issued fetch carries a monotonically increasing token. The token
//! recorded for a key is the ground truth for whether a completing task is
//! still the live request for that key; the cancel flag is only the early-exit
//! optimization. A completion whose token no longer matches is discarded
//! without touching the sink.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;

use crate::core::camera::CameraPose;
use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec3};
use crate::streaming::config::StreamerConfig;
use crate::streaming::fetch::{AssetFetcher, CancelFlag, FetchError, FetchOptions, Priority};
use crate::streaming::parse;
use crate::streaming::want::{self, ModelTransform, WantSet};
use crate::world::gates::{GateEvaluator, GateTable};
use crate::world::grid::ChunkKey;
use crate::world::index::{ChunkMeta, WorldIndex, gate_table_from_json};

/// Receiver of admitted chunk payloads, owned by the host renderer
///
/// For any key the streamer calls `admit` at most once per residency cycle
/// and `evict` exactly once afterwards; both always come from the driver.
pub trait ChunkSink {
    /// A chunk became resident. `triples` is the flat `x, y, z, ...` array of
    /// admitted entity positions; it may be empty.
    fn admit(&mut self, key: ChunkKey, triples: &[f32]);

    /// A previously admitted chunk left the resident set.
    fn evict(&mut self, key: ChunkKey);
}

/// Counters exposed to the host
#[derive(Clone, Debug, Default)]
pub struct StreamStats {
    /// Fetches issued
    pub started: u64,
    /// Chunks admitted to the sink
    pub loaded: u64,
    /// Fetches cancelled before admission
    pub aborted: u64,
    /// Fetches that failed
    pub failed: u64,
    /// Short message from the most recent failure
    pub last_error: Option<String>,
}

/// Residency state of one chunk. A key is either in flight or resident,
/// never both.
enum ChunkState {
    Loading { token: u64, cancel: CancelFlag },
    Loaded,
}

enum FetchOutcome {
    Admitted(Vec<f32>),
    Aborted,
    Failed(String),
}

/// Terminal report of one background fetch
struct Completion {
    key: ChunkKey,
    token: u64,
    outcome: FetchOutcome,
}

/// Everything a fetch task needs, captured at issue time
///
/// Tasks never touch live streamer state: the gate evaluator is a snapshot,
/// and results flow back through the completion channel.
struct FetchJob {
    text_path: String,
    bin_path: Option<String>,
    opts: FetchOptions,
    gates: GateEvaluator,
    binary_enabled: Arc<AtomicBool>,
}

/// Streams a chunk-partitioned entity world around a moving viewpoint
pub struct WorldStreamer {
    fetcher: Arc<dyn AssetFetcher>,
    /// Mutable between ticks; sanitized at the start of each update
    pub config: StreamerConfig,
    model: ModelTransform,
    center_override: Option<Vec3>,
    index: Option<Arc<WorldIndex>>,
    gates: GateEvaluator,
    chunks: HashMap<ChunkKey, ChunkState>,
    next_token: u64,
    stats: StreamStats,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    /// Cleared on the first missing binary companion; never set again
    binary_enabled: Arc<AtomicBool>,
    handle: Handle,
    /// Kept alive when the streamer owns its runtime
    #[allow(dead_code)]
    runtime: Option<Runtime>,
}

impl WorldStreamer {
    /// Create a streamer with its own dedicated tokio runtime
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: StreamerConfig) -> Self {
        let runtime = Runtime::new().expect("failed to create tokio runtime");
        let handle = runtime.handle().clone();
        Self::with_handle(fetcher, config, handle, Some(runtime))
    }

    /// Create a streamer on the ambient tokio runtime
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn new_with_current_runtime(fetcher: Arc<dyn AssetFetcher>, config: StreamerConfig) -> Self {
        Self::with_handle(fetcher, config, Handle::current(), None)
    }

    fn with_handle(
        fetcher: Arc<dyn AssetFetcher>,
        config: StreamerConfig,
        handle: Handle,
        runtime: Option<Runtime>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            config,
            model: ModelTransform::default(),
            center_override: None,
            index: None,
            gates: GateEvaluator::default(),
            chunks: HashMap::new(),
            next_token: 0,
            stats: StreamStats::default(),
            completion_tx,
            completion_rx,
            binary_enabled: Arc::new(AtomicBool::new(true)),
            handle,
            runtime,
        }
    }

    /// Load the world index and the optional gate table
    ///
    /// Until this succeeds the streamer is disabled and `update` is a no-op.
    /// A missing or malformed gate table only disables gating; a present,
    /// non-empty one disables the binary fast path (binary payloads carry no
    /// archetype hashes to gate on).
    pub async fn init(&mut self, index_path: &str, gates_path: Option<&str>) -> Result<()> {
        let text = self.fetch_text(index_path).await.map_err(|e| {
            Error::Index(format!("index unavailable: {e}"))
        })?;
        let index = WorldIndex::from_json(&text)?;
        log::info!(
            "world index loaded: {} chunks of size {}",
            index.chunks.len(),
            index.chunk_size
        );

        if let Some(path) = gates_path {
            match self.load_gate_table(path).await {
                Ok(table) if !table.is_empty() => {
                    log::info!(
                        "gate table loaded: {} records; binary fast path disabled",
                        table.len()
                    );
                    self.binary_enabled.store(false, Ordering::Relaxed);
                    self.gates.set_table(Some(Arc::new(table)));
                }
                Ok(_) => {}
                Err(e) => log::warn!("gate table unavailable: {e}"),
            }
        }

        self.index = Some(Arc::new(index));
        Ok(())
    }

    /// Blocking wrapper around [`init`](Self::init) for hosts that drive the
    /// streamer from a plain render thread
    pub fn init_blocking(&mut self, index_path: &str, gates_path: Option<&str>) -> Result<()> {
        let handle = self.handle.clone();
        handle.block_on(self.init(index_path, gates_path))
    }

    async fn fetch_text(&self, path: &str) -> Result<String> {
        let bytes = self.fetcher.fetch_bytes(path, &FetchOptions::default()).await?;
        String::from_utf8(bytes).map_err(|e| Error::Index(format!("{path} is not UTF-8: {e}")))
    }

    async fn load_gate_table(&self, path: &str) -> Result<GateTable> {
        let text = self.fetch_text(path).await?;
        gate_table_from_json(&text)
    }

    /// Whether `init` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    /// Set the fixed data-to-viewer transform (identity by default)
    pub fn set_model_transform(&mut self, to_view: Mat4) {
        self.model = ModelTransform::new(to_view);
    }

    /// Override the streaming center with a data-space point, or clear the
    /// override to follow the camera again
    pub fn set_center_override(&mut self, center: Option<Vec3>) {
        self.center_override = center;
    }

    /// Update hour and/or weather; returns whether either value changed.
    /// Changes apply to fetches issued afterwards.
    pub fn set_time_weather(&mut self, hour: Option<i32>, weather: Option<&str>) -> bool {
        self.gates.set_time_weather(hour, weather)
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Keys currently resident
    pub fn loaded_keys(&self) -> Vec<ChunkKey> {
        self.chunks
            .iter()
            .filter(|(_, state)| matches!(state, ChunkState::Loaded))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Keys currently in flight
    pub fn loading_keys(&self) -> Vec<ChunkKey> {
        self.chunks
            .iter()
            .filter(|(_, state)| matches!(state, ChunkState::Loading { .. }))
            .map(|(key, _)| *key)
            .collect()
    }

    /// The wanted keys for a camera pose, without side effects
    ///
    /// Same calculation `update` performs; hosts use it for preloading.
    pub fn get_wanted_keys(&self, camera: &CameraPose) -> Vec<ChunkKey> {
        let Some(index) = &self.index else {
            return Vec::new();
        };
        let mut config = self.config.clone();
        config.sanitize();
        self.build_want(camera, index, &config).order
    }

    /// Run one streaming tick: observe finished fetches, evict and cancel
    /// what is no longer wanted, and issue new fetches up to the budget.
    /// Nonblocking; never fails.
    pub fn update(&mut self, camera: &CameraPose, sink: &mut dyn ChunkSink) {
        let Some(index) = self.index.clone() else {
            return;
        };
        self.config.sanitize();
        self.gates.set_enabled(self.config.enable_time_weather_gating);

        self.drain_completions(sink);

        let want = self.build_want(camera, &index, &self.config);
        let wanted: HashSet<ChunkKey> = want.order.iter().copied().collect();

        self.evict_unwanted(&wanted, sink);
        self.cancel_unwanted(&wanted);
        self.trim_to_cap(&want, sink);
        self.issue_wanted(&want, &index);
    }

    fn build_want(&self, camera: &CameraPose, index: &WorldIndex, config: &StreamerConfig) -> WantSet {
        want::build_want_set(
            camera,
            &index.grid(),
            &self.model,
            config.radius_chunks,
            config.enable_frustum_culling,
            self.center_override,
        )
    }

    /// Apply terminal fetch transitions queued since the last tick
    fn drain_completions(&mut self, sink: &mut dyn ChunkSink) {
        while let Ok(done) = self.completion_rx.try_recv() {
            let live = matches!(
                self.chunks.get(&done.key),
                Some(ChunkState::Loading { token, .. }) if *token == done.token
            );
            if !live {
                // Superseded or already cancelled; the work is void
                continue;
            }
            match done.outcome {
                FetchOutcome::Admitted(triples) => {
                    self.chunks.insert(done.key, ChunkState::Loaded);
                    self.stats.loaded += 1;
                    sink.admit(done.key, &triples);
                }
                FetchOutcome::Aborted => {
                    self.chunks.remove(&done.key);
                    self.stats.aborted += 1;
                }
                FetchOutcome::Failed(message) => {
                    self.chunks.remove(&done.key);
                    self.stats.failed += 1;
                    log::warn!("chunk {} failed: {message}", done.key);
                    self.stats.last_error = Some(message);
                }
            }
        }
    }

    fn evict_unwanted(&mut self, wanted: &HashSet<ChunkKey>, sink: &mut dyn ChunkSink) {
        let stale: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|(key, state)| matches!(state, ChunkState::Loaded) && !wanted.contains(*key))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.chunks.remove(&key);
            log::debug!("evicting {key}");
            sink.evict(key);
        }
    }

    fn cancel_unwanted(&mut self, wanted: &HashSet<ChunkKey>) {
        let doomed: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|(key, state)| {
                matches!(state, ChunkState::Loading { .. }) && !wanted.contains(*key)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in doomed {
            if let Some(ChunkState::Loading { cancel, .. }) = self.chunks.remove(&key) {
                cancel.cancel();
                self.stats.aborted += 1;
                log::debug!("cancelled {key}");
            }
        }
    }

    /// Evict the loaded keys farthest from the head of the wanted list until
    /// the resident count fits the cap
    fn trim_to_cap(&mut self, want: &WantSet, sink: &mut dyn ChunkSink) {
        let loaded = self.loaded_keys();
        let excess = loaded.len().saturating_sub(self.config.max_loaded_chunks);
        if excess == 0 {
            return;
        }
        let anchor = want.order.first().copied().unwrap_or(ChunkKey::new(0, 0));

        let mut ranked: Vec<(i64, String, ChunkKey)> = loaded
            .into_iter()
            .map(|key| (key.distance_sq(anchor), key.to_string(), key))
            .collect();
        // Farthest first; equal distances evict the later textual form first
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        for (_, _, key) in ranked.into_iter().take(excess) {
            self.chunks.remove(&key);
            log::debug!("over cap, evicting {key}");
            sink.evict(key);
        }
    }

    fn issue_wanted(&mut self, want: &WantSet, index: &Arc<WorldIndex>) {
        let cutoff = self.config.high_priority_cutoff();
        let budget = self.config.max_new_loads_per_update;
        let mut issued = 0;

        for (rank, key) in want.order.iter().enumerate() {
            if issued >= budget {
                break;
            }
            if self.chunks.contains_key(key) {
                continue;
            }
            // Keys outside the index are not loadable; they cost no budget
            let Some(meta) = index.chunks.get(key) else {
                continue;
            };
            let priority = if rank < cutoff { Priority::High } else { Priority::Low };
            self.issue(*key, meta.clone(), index, priority);
            issued += 1;
        }
    }

    fn issue(&mut self, key: ChunkKey, meta: ChunkMeta, index: &WorldIndex, priority: Priority) {
        self.next_token += 1;
        let token = self.next_token;
        let cancel = CancelFlag::new();
        self.chunks.insert(
            key,
            ChunkState::Loading {
                token,
                cancel: cancel.clone(),
            },
        );
        self.stats.started += 1;

        let job = FetchJob {
            text_path: index.chunk_path(&meta.file),
            bin_path: if self.config.prefer_binary {
                meta.bin.as_deref().map(|f| index.chunk_path(f))
            } else {
                None
            },
            opts: FetchOptions {
                priority,
                use_persistent_cache: self.config.use_persistent_cache_for_chunks,
                cancel,
            },
            gates: self.gates.clone(),
            binary_enabled: Arc::clone(&self.binary_enabled),
        };

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.completion_tx.clone();
        self.handle.spawn(async move {
            let outcome = run_fetch(fetcher, job).await;
            // The driver may be gone; then nobody cares about the result
            let _ = tx.send(Completion { key, token, outcome });
        });
    }
}

impl Drop for WorldStreamer {
    fn drop(&mut self) {
        for state in self.chunks.values() {
            if let ChunkState::Loading { cancel, .. } = state {
                cancel.cancel();
            }
        }
    }
}

/// Fetch and decode one chunk payload
///
/// Tries the packed binary companion when allowed, falling back to the text
/// payload on any binary problem. A missing companion additionally disables
/// the fast path for all later fetches of this streamer.
async fn run_fetch(fetcher: Arc<dyn AssetFetcher>, job: FetchJob) -> FetchOutcome {
    let cancel = job.opts.cancel.clone();
    if cancel.is_cancelled() {
        return FetchOutcome::Aborted;
    }

    if let Some(bin_path) = &job.bin_path {
        if job.binary_enabled.load(Ordering::Relaxed) {
            match fetcher.fetch_bytes(bin_path, &job.opts).await {
                Ok(bytes) => match parse::decode_binary(&bytes) {
                    Ok(triples) => {
                        if cancel.is_cancelled() {
                            return FetchOutcome::Aborted;
                        }
                        return FetchOutcome::Admitted(triples);
                    }
                    Err(e) => {
                        log::debug!("binary payload {bin_path} rejected ({e}), using text");
                    }
                },
                Err(FetchError::Cancelled) => return FetchOutcome::Aborted,
                Err(FetchError::NotFound(_)) => {
                    log::debug!("no binary companion at {bin_path}, fast path off");
                    job.binary_enabled.store(false, Ordering::Relaxed);
                }
                Err(e) => {
                    log::debug!("binary payload {bin_path} unavailable ({e}), using text");
                }
            }
        }
    }

    let mut triples = Vec::new();
    let gates = &job.gates;
    let result = fetcher
        .fetch_lines(&job.text_path, &job.opts, &mut |line| {
            if let Some(entity) = parse::decode_entity(line) {
                if gates.is_available(entity.archetype_hash) {
                    triples.extend_from_slice(&entity.position);
                }
            }
        })
        .await;

    match result {
        Ok(()) if cancel.is_cancelled() => FetchOutcome::Aborted,
        Ok(()) => FetchOutcome::Admitted(triples),
        Err(FetchError::Cancelled) => FetchOutcome::Aborted,
        Err(e) => FetchOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Fetcher that must never be reached
    struct UnreachableFetcher;

    #[async_trait]
    impl AssetFetcher for UnreachableFetcher {
        async fn fetch_lines(
            &self,
            path: &str,
            _opts: &FetchOptions,
            _on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> std::result::Result<(), FetchError> {
            panic!("unexpected fetch_lines({path})");
        }

        async fn fetch_bytes(
            &self,
            path: &str,
            _opts: &FetchOptions,
        ) -> std::result::Result<Vec<u8>, FetchError> {
            Err(FetchError::NotFound(path.to_string()))
        }
    }

    #[derive(Default)]
    struct NullSink {
        admits: usize,
        evicts: usize,
    }

    impl ChunkSink for NullSink {
        fn admit(&mut self, _key: ChunkKey, _triples: &[f32]) {
            self.admits += 1;
        }

        fn evict(&mut self, _key: ChunkKey) {
            self.evicts += 1;
        }
    }

    #[tokio::test]
    async fn test_update_is_noop_before_init() {
        let mut streamer = WorldStreamer::new_with_current_runtime(
            Arc::new(UnreachableFetcher),
            StreamerConfig::default(),
        );
        assert!(!streamer.is_initialized());

        let camera = CameraPose::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::new(100.0, 100.0, 0.0));
        let mut sink = NullSink::default();
        streamer.update(&camera, &mut sink);

        assert_eq!(sink.admits, 0);
        assert_eq!(sink.evicts, 0);
        assert_eq!(streamer.stats().started, 0);
        assert!(streamer.get_wanted_keys(&camera).is_empty());
    }

    #[tokio::test]
    async fn test_init_fails_on_missing_index() {
        let mut streamer = WorldStreamer::new_with_current_runtime(
            Arc::new(UnreachableFetcher),
            StreamerConfig::default(),
        );
        let err = streamer.init("index.json", None).await.unwrap_err();
        assert!(matches!(err, Error::Index(_)));
        assert!(!streamer.is_initialized());
    }
}
