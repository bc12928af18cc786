//! Append-only access log.

use crate::models::{AccessAction, AccessLogEntry};

/// Selects log entries by model id and/or action.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFilter<'a> {
    pub model_id: Option<&'a str>,
    pub action: Option<AccessAction>,
}

impl<'a> LogFilter<'a> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_model(model_id: &'a str) -> Self {
        Self {
            model_id: Some(model_id),
            action: None,
        }
    }

    pub fn with_action(mut self, action: AccessAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn matches(&self, entry: &AccessLogEntry) -> bool {
        self.model_id.map_or(true, |id| entry.concerns(id))
            && self.action.map_or(true, |action| entry.action == action)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessLog {
    entries: Vec<AccessLogEntry>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<AccessLogEntry>) -> Self {
        Self { entries }
    }

    pub fn append(&mut self, entry: AccessLogEntry) {
        self.entries.push(entry);
    }

    /// Entries matching `filter`, oldest first. The iterator can be cloned to
    /// walk the same selection again.
    pub fn query<'a>(
        &'a self,
        filter: LogFilter<'a>,
    ) -> impl Iterator<Item = &'a AccessLogEntry> + Clone + 'a {
        self.entries.iter().filter(move |entry| filter.matches(entry))
    }

    pub fn entries(&self) -> &[AccessLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries past `len`. Only used to undo an append whose
    /// persistence failed.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}
