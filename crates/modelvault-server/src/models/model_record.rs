//! Model record stored in the catalog document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RegistryError;
use crate::store::{ACCESS_LOG_FILE, CATALOG_FILE};

/// Possible states of a model in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// A fetch is in flight (or was, if the process died during it).
    Downloading,
    /// Artifact files are on disk and usable.
    Ready,
    /// The last fetch attempt failed; see `ModelRecord::error`.
    Error,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Downloading => "downloading",
            ModelStatus::Ready => "ready",
            ModelStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents one artifact tracked by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Catalog key, derived from `name` by `model_id_for`.
    pub id: String,
    /// Hub identifier as given by the requester (e.g. `google/flan-t5-small`).
    pub name: String,
    /// Directory holding the artifact files.
    pub path: String,
    pub size_bytes: u64,
    pub status: ModelStatus,
    /// When this record was first created.
    pub downloaded_at: DateTime<Utc>,
    /// Most recent requester that triggered a download of this model.
    pub downloaded_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Cause of the last failed fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelRecord {
    /// Creates the `downloading` placeholder held while a fetch runs.
    pub fn placeholder(name: &str, mount_point: &Path, requester: &str) -> Result<Self, RegistryError> {
        let id = model_id_for(name)?;
        let path = mount_point.join(&id).to_string_lossy().into_owned();
        Ok(Self {
            id,
            name: name.to_string(),
            path,
            size_bytes: 0,
            status: ModelStatus::Downloading,
            downloaded_at: Utc::now(),
            downloaded_by: Some(requester.to_string()),
            updated_at: None,
            error: None,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.status == ModelStatus::Ready
    }
}

/// Derives the catalog id for a hub name by replacing `/` with `_`.
///
/// Rejects names that would produce an id unusable as a directory under the
/// mount point, or one that shadows the catalog documents.
pub fn model_id_for(name: &str) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::InvalidRequest(
            "model_name must not be empty".to_string(),
        ));
    }
    if name.contains('\\') || name.contains('\0') {
        return Err(RegistryError::InvalidRequest(format!(
            "model_name contains forbidden characters: '{}'",
            name
        )));
    }

    let id = name.replace('/', "_");
    if id.starts_with('.') || id == CATALOG_FILE || id == ACCESS_LOG_FILE {
        return Err(RegistryError::InvalidRequest(format!(
            "model_name '{}' maps to a reserved id '{}'",
            name, id
        )));
    }

    Ok(id)
}
