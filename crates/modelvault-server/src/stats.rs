//! Statistics derived from the registry and the access log.
//!
//! Nothing here is cached: the log is the source of truth and every call
//! rescans it.

use std::collections::HashSet;

use crate::access_log::{AccessLog, LogFilter};
use crate::models::{AccessAction, ModelStats, SystemStats};
use crate::registry::ModelRegistry;

/// Number of entries reported in `SystemStats::recent_activity`.
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Computes usage statistics for `model_id`.
///
/// The first download is the entry with the smallest timestamp; entries with
/// equal timestamps are ordered by their position in the log.
pub fn model_stats(log: &AccessLog, model_id: &str) -> ModelStats {
    let entries = log.query(LogFilter::for_model(model_id));

    let mut stats = ModelStats::default();
    for entry in entries.clone() {
        stats.total_requests += 1;
        match entry.action {
            AccessAction::Download => stats.download_count += 1,
            AccessAction::Get => stats.access_count += 1,
            _ => {}
        }
    }

    // min_by_key keeps the earliest element among equal keys.
    let first_download = entries
        .filter(|entry| entry.action == AccessAction::Download)
        .min_by_key(|entry| entry.timestamp);
    if let Some(first) = first_download {
        stats.first_downloaded_by = Some(first.username.clone());
        stats.first_downloaded_at = Some(first.timestamp);
        stats.first_downloaded_from = Some(first.ip_address.clone());
    }

    stats
}

/// Computes system-wide statistics in one pass over the log.
pub fn system_stats(registry: &ModelRegistry, log: &AccessLog) -> SystemStats {
    let mut users = HashSet::new();
    for entry in log.entries() {
        users.insert(entry.username.as_str());
    }

    let recent_activity = log
        .entries()
        .iter()
        .rev()
        .take(RECENT_ACTIVITY_LIMIT)
        .cloned()
        .collect();

    SystemStats {
        total_models: registry.len(),
        total_size_bytes: registry.total_size_bytes(),
        total_requests: log.len(),
        unique_users: users.len(),
        recent_activity,
    }
}
