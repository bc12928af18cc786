//! JSON document store for the model catalog and the access log.
//!
//! Both documents are read fully on startup and rewritten in full on every
//! mutation. Each rewrite goes through a temp file in the same directory that
//! is fsynced and then renamed over the target, so a document on disk is
//! always either the old or the new version. The coordinator writes the log
//! first and the catalog second; a crash between the two renames leaves the
//! log one mutation ahead of the catalog.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::{model_id_for, AccessLogEntry, ModelRecord};

/// File name of the catalog document under the store root.
pub const CATALOG_FILE: &str = "models_db.json";
/// File name of the access log document under the store root.
pub const ACCESS_LOG_FILE: &str = "access_log.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Owns the on-disk location of the two documents.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    pub fn access_log_path(&self) -> PathBuf {
        self.root.join(ACCESS_LOG_FILE)
    }

    /// Reads both documents. Missing or blank documents count as empty.
    pub async fn load(&self) -> Result<(Vec<ModelRecord>, Vec<AccessLogEntry>), StoreError> {
        let catalog_path = self.catalog_path();
        let catalog = match read_document(&catalog_path).await? {
            Some(bytes) => {
                serde_json::from_slice::<CatalogIn>(&bytes)
                    .map_err(corrupt_error(&catalog_path))?
                    .0
            }
            None => Vec::new(),
        };

        let log_path = self.access_log_path();
        let log = match read_document(&log_path).await? {
            Some(bytes) => serde_json::from_slice::<Vec<AccessLogEntry>>(&bytes)
                .map_err(corrupt_error(&log_path))?,
            None => Vec::new(),
        };

        tracing::debug!(
            models = catalog.len(),
            log_entries = log.len(),
            root = %self.root.display(),
            "Loaded catalog documents"
        );

        Ok((catalog, log))
    }

    /// Rewrites the catalog document, keeping the given record order.
    pub async fn persist_catalog(&self, records: &[ModelRecord]) -> Result<(), StoreError> {
        let path = self.catalog_path();
        let bytes =
            serde_json::to_vec_pretty(&CatalogOut(records)).map_err(corrupt_error(&path))?;
        write_atomic(&path, &bytes).await
    }

    /// Rewrites the access log document.
    pub async fn persist_log(&self, entries: &[AccessLogEntry]) -> Result<(), StoreError> {
        let path = self.access_log_path();
        let bytes = serde_json::to_vec_pretty(entries).map_err(corrupt_error(&path))?;
        write_atomic(&path, &bytes).await
    }
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt_error(path: &Path) -> impl Fn(serde_json::Error) -> StoreError + '_ {
    move |source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    }
}

async fn read_document(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp.{}", file_name, Uuid::new_v4()));

    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(io_error(path)(e));
    }
    Ok(())
}

/// Serializes records as a JSON object keyed by id, in slice order.
struct CatalogOut<'a>(&'a [ModelRecord]);

impl Serialize for CatalogOut<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in self.0 {
            map.serialize_entry(&record.id, record)?;
        }
        map.end()
    }
}

/// Deserializes the catalog object in document order, validating keys.
struct CatalogIn(Vec<ModelRecord>);

impl<'de> Deserialize<'de> for CatalogIn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CatalogVisitor)
    }
}

struct CatalogVisitor;

impl<'de> Visitor<'de> for CatalogVisitor {
    type Value = CatalogIn;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of model id to model record")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<CatalogIn, A::Error> {
        use serde::de::Error;

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        while let Some((key, record)) = access.next_entry::<String, ModelRecord>()? {
            if key != record.id {
                return Err(A::Error::custom(format!(
                    "catalog key '{}' does not match record id '{}'",
                    key, record.id
                )));
            }
            let derived = model_id_for(&record.name).map_err(A::Error::custom)?;
            if derived != record.id {
                return Err(A::Error::custom(format!(
                    "record id '{}' does not derive from name '{}'",
                    record.id, record.name
                )));
            }
            if !seen.insert(key.clone()) {
                return Err(A::Error::custom(format!("duplicate catalog key '{}'", key)));
            }
            records.push(record);
        }
        Ok(CatalogIn(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessAction, ModelStatus, Requester};

    fn record(name: &str) -> ModelRecord {
        let mut record = ModelRecord::placeholder(name, Path::new("/models"), "alice").unwrap();
        record.status = ModelStatus::Ready;
        record.size_bytes = 42;
        record
    }

    #[tokio::test]
    async fn test_load_missing_documents_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("nested")).await.unwrap();

        let (catalog, log) = store.load().await.unwrap();
        assert!(catalog.is_empty());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_load_blank_documents_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        std::fs::write(store.catalog_path(), b"").unwrap();
        std::fs::write(store.access_log_path(), b"  \n").unwrap();

        let (catalog, log) = store.load().await.unwrap();
        assert!(catalog.is_empty());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_persist_keeps_catalog_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let records = vec![record("zeta"), record("alpha"), record("org/mid")];
        store.persist_catalog(&records).await.unwrap();

        let (loaded, _) = store.load().await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "org_mid"]);
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_persist_log_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let requester = Requester::new("bob", "10.0.0.2");
        let entries = vec![
            AccessLogEntry::new(AccessAction::List, None, &requester),
            AccessLogEntry::new(AccessAction::Download, Some("gpt2"), &requester),
        ];
        store.persist_log(&entries).await.unwrap();

        let (_, log) = store.load().await.unwrap();
        assert_eq!(log, entries);
    }

    #[tokio::test]
    async fn test_persist_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        store.persist_catalog(&[record("gpt2")]).await.unwrap();
        store.persist_catalog(&[]).await.unwrap();
        store.persist_log(&[]).await.unwrap();

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![ACCESS_LOG_FILE.to_string(), CATALOG_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_catalog_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        std::fs::write(store.catalog_path(), b"{ not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_catalog_key_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let doc = serde_json::json!({ "other": record("gpt2") });
        std::fs::write(store.catalog_path(), doc.to_string()).unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("does not match record id"));
    }

    #[tokio::test]
    async fn test_unknown_status_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let mut doc = serde_json::json!({ "gpt2": record("gpt2") });
        doc["gpt2"]["status"] = serde_json::json!("paused");
        std::fs::write(store.catalog_path(), doc.to_string()).unwrap();

        assert!(matches!(
            store.load().await.unwrap_err(),
            StoreError::Corrupt { .. }
        ));
    }

    #[tokio::test]
    async fn test_corrupt_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        std::fs::write(store.access_log_path(), b"{\"not\": \"a list\"}").unwrap();

        assert!(matches!(
            store.load().await.unwrap_err(),
            StoreError::Corrupt { .. }
        ));
    }
}
