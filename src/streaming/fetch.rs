//! Asset fetching boundary
//!
//! The streamer itself never touches disk or network; everything goes through
//! [`AssetFetcher`]. Implementations own their transport, caching, and global
//! concurrency; the streamer only passes a priority class, a persistent-cache
//! hint, and a cancel flag per request.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Semaphore;

/// Fetch error surfaced by an [`AssetFetcher`]
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Priority class forwarded to the fetcher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

/// Cooperative cancellation flag
///
/// Cloned into every stage of a request; firing it is idempotent. The fetcher
/// checks it between suspension points and stops producing bytes promptly.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-request options
#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub priority: Priority,
    pub use_persistent_cache: bool,
    pub cancel: CancelFlag,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            priority: Priority::High,
            use_persistent_cache: false,
            cancel: CancelFlag::new(),
        }
    }
}

/// Source of world assets (index, gate table, chunk payloads)
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Stream a newline-delimited text asset, invoking `on_line` per line
    ///
    /// Implementations must observe `opts.cancel` between lines and return
    /// [`FetchError::Cancelled`] once it fires.
    async fn fetch_lines(
        &self,
        path: &str,
        opts: &FetchOptions,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<(), FetchError>;

    /// Fetch a whole asset as bytes
    async fn fetch_bytes(&self, path: &str, opts: &FetchOptions) -> Result<Vec<u8>, FetchError>;
}

/// Filesystem-backed fetcher with a bounded number of concurrent reads
///
/// Paths are resolved against a base directory. The persistent-cache hint is
/// ignored; local disk already is the persistent medium.
pub struct FsFetcher {
    base_dir: PathBuf,
    permits: Semaphore,
}

impl FsFetcher {
    /// Create a fetcher rooted at `base_dir` with at most `max_concurrent`
    /// reads in flight
    pub fn new(base_dir: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    fn map_io(path: &str, err: std::io::Error) -> FetchError {
        if err.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotFound(path.to_string())
        } else {
            FetchError::Failed(format!("{path}: {err}"))
        }
    }
}

#[async_trait]
impl AssetFetcher for FsFetcher {
    async fn fetch_lines(
        &self,
        path: &str,
        opts: &FetchOptions,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<(), FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Failed("fetcher shut down".into()))?;

        if opts.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let file = tokio::fs::File::open(self.resolve(path))
            .await
            .map_err(|e| Self::map_io(path, e))?;
        let mut lines = tokio::io::BufReader::new(file).lines();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Self::map_io(path, e))?
        {
            if opts.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            on_line(&line);
        }
        Ok(())
    }

    async fn fetch_bytes(&self, path: &str, opts: &FetchOptions) -> Result<Vec<u8>, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Failed("fetcher shut down".into()))?;

        if opts.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| Self::map_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_idempotent_and_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_fetch_lines_streams_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ndjson"), "one\ntwo\nthree\n").unwrap();

        let fetcher = FsFetcher::new(dir.path(), 4);
        let mut seen = Vec::new();
        fetcher
            .fetch_lines("a.ndjson", &FetchOptions::default(), &mut |line| {
                seen.push(line.to_string());
            })
            .await
            .unwrap();
        assert_eq!(seen, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_fetch_bytes_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.bin"), [1u8, 2, 3]).unwrap();

        let fetcher = FsFetcher::new(dir.path(), 4);
        let bytes = fetcher
            .fetch_bytes("b.bin", &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(bytes, [1, 2, 3]);

        let err = fetcher
            .fetch_bytes("missing.bin", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_prefired_cancel_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.ndjson"), "line\n").unwrap();

        let fetcher = FsFetcher::new(dir.path(), 4);
        let opts = FetchOptions::default();
        opts.cancel.cancel();

        let mut called = false;
        let err = fetcher
            .fetch_lines("c.ndjson", &opts, &mut |_| called = true)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(!called);
    }
}
