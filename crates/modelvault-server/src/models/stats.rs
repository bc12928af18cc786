//! Derived statistics shapes. Never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access_log_entry::AccessLogEntry;
use super::model_record::ModelRecord;

/// Usage statistics for a single model id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub download_count: usize,
    /// Number of `get` requests.
    pub access_count: usize,
    pub total_requests: usize,
    pub first_downloaded_by: Option<String>,
    pub first_downloaded_at: Option<DateTime<Utc>>,
    pub first_downloaded_from: Option<String>,
}

/// System-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_models: usize,
    pub total_size_bytes: u64,
    pub total_requests: usize,
    pub unique_users: usize,
    /// Most recent entries first.
    pub recent_activity: Vec<AccessLogEntry>,
}

/// A model record as returned by the API, with its stats attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelView {
    #[serde(flatten)]
    pub record: ModelRecord,
    pub stats: ModelStats,
}
