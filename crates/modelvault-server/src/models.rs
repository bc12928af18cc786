//! Catalog and access log data types.

pub mod access_log_entry;
pub mod model_record;
pub mod stats;

pub use access_log_entry::{AccessAction, AccessLogEntry, Requester};
pub use model_record::{model_id_for, ModelRecord, ModelStatus};
pub use stats::{ModelStats, ModelView, SystemStats};
