//! Artifact fetch collaborator.
//!
//! The coordinator calls `fetch` once per first-time download and treats any
//! error as a terminal failure of that attempt.

pub mod hub;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use hub::HubFetcher;

/// Where a fetched model landed and how big it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("model not found on hub: {0}")]
    NotFound(String),

    #[error("hub requires authentication for {0}")]
    AuthRequired(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another request was already fetching the same model and failed.
    #[error("concurrent download failed: {0}")]
    Concurrent(String),
}

/// Source of model artifacts.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Fetches every file of `name` into local storage.
    async fn fetch(&self, name: &str) -> Result<FetchedArtifact, FetchError>;

    /// Removes the local files of a deleted model.
    async fn remove(&self, path: &Path) -> Result<(), FetchError>;
}
