//! In-memory model registry.
//!
//! Records are kept in insertion order with a side index by id. Durability is
//! handled by the coordinator, not here.

use chrono::Utc;
use std::collections::HashMap;

use crate::error::RegistryError;
use crate::models::ModelRecord;

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    records: Vec<ModelRecord>,
    index: HashMap<String, usize>,
    revision: u64,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from records in catalog order.
    pub fn from_records(records: Vec<ModelRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id.clone(), pos))
            .collect();
        Self {
            records,
            index,
            revision: 0,
        }
    }

    pub fn get(&self, id: &str) -> Result<&ModelRecord, RegistryError> {
        self.index
            .get(id)
            .map(|&pos| &self.records[pos])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// All records in insertion order.
    pub fn list(&self) -> &[ModelRecord] {
        &self.records
    }

    pub fn exists(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts `record`, or replaces the mutable fields of the record with the
    /// same id. `name` and `downloaded_at` of an existing record are kept and
    /// `updated_at` is set. Returns `true` for a fresh insert.
    pub fn upsert(&mut self, record: ModelRecord) -> bool {
        self.revision += 1;
        match self.index.get(&record.id) {
            Some(&pos) => {
                let existing = &mut self.records[pos];
                existing.path = record.path;
                existing.size_bytes = record.size_bytes;
                existing.status = record.status;
                existing.downloaded_by = record.downloaded_by;
                existing.error = record.error;
                existing.updated_at = Some(Utc::now());
                false
            }
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    /// Removes the record with `id`. Returns `false` if it was absent.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.index.remove(id) else {
            return false;
        };
        self.records.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        self.revision += 1;
        true
    }

    /// Sum of `size_bytes` over all records.
    pub fn total_size_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.size_bytes).sum()
    }

    /// Monotonic counter bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
