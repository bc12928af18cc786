//! Access log entries recorded for every catalog request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of request recorded in the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    List,
    Get,
    Download,
    Update,
    Delete,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::List => "list",
            AccessAction::Get => "get",
            AccessAction::Download => "download",
            AccessAction::Update => "update",
            AccessAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for AccessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who issued a request and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub username: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl Requester {
    pub fn new(username: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ip_address: ip_address.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// One immutable line of the access log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AccessAction,
    /// `None` for catalog-wide actions such as `list`.
    pub model_id: Option<String>,
    pub username: String,
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AccessLogEntry {
    /// Builds an entry stamped with the current time.
    pub fn new(action: AccessAction, model_id: Option<&str>, requester: &Requester) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            model_id: model_id.map(str::to_string),
            username: requester.username.clone(),
            ip_address: requester.ip_address.clone(),
            user_agent: requester.user_agent.clone(),
        }
    }

    pub fn concerns(&self, model_id: &str) -> bool {
        self.model_id.as_deref() == Some(model_id)
    }
}
