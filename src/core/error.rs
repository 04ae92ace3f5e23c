//! Error types for the streaming core

use thiserror::Error;

use crate::streaming::fetch::FetchError;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("world index error: {0}")]
    Index(String),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
