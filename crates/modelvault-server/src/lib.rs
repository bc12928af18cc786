//! modelvault server - catalog of downloaded models
//!
//! This crate keeps a persistent registry of models fetched from a model hub,
//! records every request against the catalog in an append-only access log,
//! and derives usage statistics and first-download attribution from it.

pub mod access_log;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod models;
pub mod registry;
pub mod routes;
pub mod stats;
pub mod store;

pub use coordinator::{Coordinator, DownloadOutcome, ModelUpdate};
pub use error::{AppError, RegistryError};
pub use fetch::{FetchError, FetchedArtifact, HubFetcher, ModelFetcher};
pub use routes::{create_router, AppState};
pub use store::JsonStore;
