//! Request coordinator.
//!
//! Owns the registry, the access log and the store behind one `RwLock`.
//! Every operation that appends to the log takes the write side and runs as a
//! critical section: mutate, persist what changed, and on a storage failure
//! restore the in-memory state to what it was on entry. Stats readers take
//! the read side and so never observe half of a critical section.
//!
//! Downloads of a model that is not yet present run in two critical sections
//! with the fetch in between. The first one inserts a `downloading`
//! placeholder and registers the attempt in `in_flight`; concurrent requests
//! for the same id wait on that attempt instead of starting their own fetch.
//! The second one finalizes the record and appends the `download` entry.
//!
//! Each public operation runs on a spawned task, so a mutation is always
//! followed by its commit or rollback even if the caller goes away.

use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::Instrument;

use crate::access_log::AccessLog;
use crate::error::RegistryError;
use crate::fetch::{FetchError, ModelFetcher};
use crate::models::{
    model_id_for, AccessAction, AccessLogEntry, ModelRecord, ModelStats, ModelStatus, ModelView,
    Requester, SystemStats,
};
use crate::registry::ModelRegistry;
use crate::stats;
use crate::store::{JsonStore, StoreError};

/// Result of a download request.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub model: ModelView,
    /// The model was already present; nothing was fetched.
    pub already_exists: bool,
}

/// Fields a client may change on an existing model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelUpdate {
    pub status: Option<ModelStatus>,
}

#[derive(Debug, Clone)]
enum FetchProgress {
    Running,
    Finished,
    Failed(String),
}

enum DownloadStep {
    Done(DownloadOutcome),
    Wait(watch::Receiver<FetchProgress>),
    Lead(watch::Sender<FetchProgress>),
}

struct CatalogState {
    registry: ModelRegistry,
    log: AccessLog,
    in_flight: HashMap<String, watch::Receiver<FetchProgress>>,
}

struct Checkpoint {
    registry: ModelRegistry,
    log_len: usize,
}

impl CatalogState {
    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            registry: self.registry.clone(),
            log_len: self.log.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.registry = checkpoint.registry;
        self.log.truncate(checkpoint.log_len);
    }

    fn view(&self, id: &str) -> Result<ModelView, RegistryError> {
        let record = self.registry.get(id)?.clone();
        let stats = stats::model_stats(&self.log, id);
        Ok(ModelView { record, stats })
    }

    fn ensure_idle(&self, id: &str) -> Result<(), RegistryError> {
        if self.in_flight.contains_key(id) {
            return Err(RegistryError::Conflict(format!(
                "model '{}' is being downloaded",
                id
            )));
        }
        Ok(())
    }
}

/// Serializes all catalog mutations.
pub struct Coordinator {
    state: RwLock<CatalogState>,
    store: JsonStore,
    fetcher: Arc<dyn ModelFetcher>,
    fetch_timeout: Duration,
}

impl Coordinator {
    /// Loads both documents from `store` and builds the coordinator.
    ///
    /// Records left `downloading` by a previous process are marked `error`.
    pub async fn open(
        store: JsonStore,
        fetcher: Arc<dyn ModelFetcher>,
        fetch_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let (records, entries) = store.load().await?;
        let mut registry = ModelRegistry::from_records(records);

        let stale: Vec<ModelRecord> = registry
            .list()
            .iter()
            .filter(|r| r.status == ModelStatus::Downloading)
            .cloned()
            .collect();
        if !stale.is_empty() {
            for mut record in stale {
                tracing::warn!(model = %record.id, "Marking interrupted download as failed");
                record.status = ModelStatus::Error;
                record.error = Some("download interrupted by server restart".to_string());
                registry.upsert(record);
            }
            store.persist_catalog(registry.list()).await?;
        }

        tracing::info!(
            models = registry.len(),
            log_entries = entries.len(),
            "Catalog loaded"
        );

        Ok(Self {
            state: RwLock::new(CatalogState {
                registry,
                log: AccessLog::from_entries(entries),
                in_flight: HashMap::new(),
            }),
            store,
            fetcher,
            fetch_timeout,
        })
    }

    /// Directory holding the catalog documents and the model directories.
    pub fn mount_point(&self) -> &Path {
        self.store.root()
    }

    /// Persists the documents touched since `checkpoint`, log first.
    /// On failure the in-memory state is rolled back to the checkpoint, and a
    /// log document already rewritten is rewritten again without the
    /// rejected entries.
    async fn commit(
        &self,
        state: &mut CatalogState,
        checkpoint: Checkpoint,
    ) -> Result<(), RegistryError> {
        let log_dirty = state.log.len() != checkpoint.log_len;
        let catalog_dirty = state.registry.revision() != checkpoint.registry.revision();

        let mut log_written = false;
        let result = async {
            if log_dirty {
                self.store.persist_log(state.log.entries()).await?;
                log_written = true;
            }
            if catalog_dirty {
                self.store.persist_catalog(state.registry.list()).await?;
            }
            Ok::<(), StoreError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "Persist failed, rolling back");
            state.restore(checkpoint);
            if log_written {
                if let Err(undo) = self.store.persist_log(state.log.entries()).await {
                    tracing::error!(error = %undo, "Could not restore access log document");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Runs `task` on its own tokio task and waits for it.
    ///
    /// Public operations go through here so that a caller dropped while a
    /// critical section is pending (an HTTP client hanging up) cannot abandon
    /// it between the in-memory mutation and the commit or rollback.
    async fn detached<T, Fut>(
        self: &Arc<Self>,
        task: impl FnOnce(Arc<Self>) -> Fut,
    ) -> Result<T, RegistryError>
    where
        Fut: Future<Output = Result<T, RegistryError>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(task(Arc::clone(self)).in_current_span())
            .await
            .map_err(|e| RegistryError::Internal(format!("catalog task failed: {}", e)))?
    }

    /// Downloads `name`, or records a repeat download if it is already present.
    #[tracing::instrument(skip(self, requester), fields(user = %requester.username))]
    pub async fn download(
        self: &Arc<Self>,
        name: &str,
        requester: &Requester,
    ) -> Result<DownloadOutcome, RegistryError> {
        let name = name.trim().to_string();
        let id = model_id_for(&name)?;
        let requester = requester.clone();
        self.detached(move |this| async move { this.run_download(&id, &name, &requester).await })
            .await
    }

    async fn run_download(
        &self,
        id: &str,
        name: &str,
        requester: &Requester,
    ) -> Result<DownloadOutcome, RegistryError> {
        loop {
            match self.begin_download(id, name, requester).await? {
                DownloadStep::Done(outcome) => return Ok(outcome),
                DownloadStep::Lead(progress) => {
                    return self.finish_download(id, name, requester, progress).await;
                }
                DownloadStep::Wait(mut progress) => {
                    tracing::debug!(model = %id, "Waiting for in-flight download");
                    let settled = progress
                        .wait_for(|p| !matches!(p, FetchProgress::Running))
                        .await
                        .map(|p| p.clone());
                    if let Ok(FetchProgress::Failed(reason)) = settled {
                        return Err(RegistryError::Fetch {
                            model_id: id.to_string(),
                            source: FetchError::Concurrent(reason),
                        });
                    }
                    // Finished, or the leader vanished: look at the catalog again.
                }
            }
        }
    }

    async fn begin_download(
        &self,
        id: &str,
        name: &str,
        requester: &Requester,
    ) -> Result<DownloadStep, RegistryError> {
        let mut state = self.state.write().await;

        let live = state
            .in_flight
            .get(id)
            .map(|p| (p.has_changed().is_ok(), p.clone()));
        match live {
            Some((true, progress)) => return Ok(DownloadStep::Wait(progress)),
            // Sender gone without settling: the attempt died.
            Some((false, _)) => {
                state.in_flight.remove(id);
            }
            None => {}
        }

        if let Ok(existing) = state.registry.get(id) {
            if existing.name != name {
                return Err(RegistryError::Conflict(format!(
                    "model id '{}' is already taken by '{}'",
                    id, existing.name
                )));
            }
            if existing.is_ready() {
                let mut refreshed = existing.clone();
                refreshed.downloaded_by = Some(requester.username.clone());

                let checkpoint = state.checkpoint();
                state.registry.upsert(refreshed);
                state
                    .log
                    .append(AccessLogEntry::new(AccessAction::Download, Some(id), requester));
                self.commit(&mut state, checkpoint).await?;

                return Ok(DownloadStep::Done(DownloadOutcome {
                    model: state.view(id)?,
                    already_exists: true,
                }));
            }
        }

        let placeholder = ModelRecord::placeholder(name, self.store.root(), &requester.username)?;
        let checkpoint = state.checkpoint();
        state.registry.upsert(placeholder);
        self.commit(&mut state, checkpoint).await?;

        let (sender, receiver) = watch::channel(FetchProgress::Running);
        state.in_flight.insert(id.to_string(), receiver);
        Ok(DownloadStep::Lead(sender))
    }

    async fn finish_download(
        &self,
        id: &str,
        name: &str,
        requester: &Requester,
        progress: watch::Sender<FetchProgress>,
    ) -> Result<DownloadOutcome, RegistryError> {
        tracing::info!(model = %name, "Fetching model");
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(name)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };

        let mut state = self.state.write().await;
        state.in_flight.remove(id);
        let mut record = state.registry.get(id)?.clone();
        let checkpoint = state.checkpoint();

        match fetched {
            Ok(artifact) => {
                record.path = artifact.path.to_string_lossy().into_owned();
                record.size_bytes = artifact.size_bytes;
                record.status = ModelStatus::Ready;
                record.error = None;
                record.downloaded_by = Some(requester.username.clone());
                state.registry.upsert(record);
                state
                    .log
                    .append(AccessLogEntry::new(AccessAction::Download, Some(id), requester));

                if let Err(e) = self.commit(&mut state, checkpoint).await {
                    progress.send_replace(FetchProgress::Failed(e.to_string()));
                    return Err(e);
                }
                progress.send_replace(FetchProgress::Finished);
                tracing::info!(model = %name, size_bytes = artifact.size_bytes, "Model ready");

                Ok(DownloadOutcome {
                    model: state.view(id)?,
                    already_exists: false,
                })
            }
            Err(source) => {
                tracing::warn!(model = %name, error = %source, "Fetch failed");
                record.status = ModelStatus::Error;
                record.error = Some(source.to_string());
                state.registry.upsert(record);
                if let Err(e) = self.commit(&mut state, checkpoint).await {
                    tracing::error!(model = %name, error = %e, "Could not record failed download");
                }
                progress.send_replace(FetchProgress::Failed(source.to_string()));

                Err(RegistryError::Fetch {
                    model_id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Returns one model with its stats, logging a `get`.
    ///
    /// The attempt is logged even when the id is unknown.
    #[tracing::instrument(skip(self, requester))]
    pub async fn get(
        self: &Arc<Self>,
        id: &str,
        requester: &Requester,
    ) -> Result<ModelView, RegistryError> {
        let (id, requester) = (id.to_string(), requester.clone());
        self.detached(move |this| async move { this.apply_get(&id, &requester).await })
            .await
    }

    async fn apply_get(&self, id: &str, requester: &Requester) -> Result<ModelView, RegistryError> {
        let mut state = self.state.write().await;
        let checkpoint = state.checkpoint();
        state
            .log
            .append(AccessLogEntry::new(AccessAction::Get, Some(id), requester));
        self.commit(&mut state, checkpoint).await?;
        state.view(id)
    }

    /// Returns every model with its stats, logging a `list`.
    pub async fn list(
        self: &Arc<Self>,
        requester: &Requester,
    ) -> Result<Vec<ModelView>, RegistryError> {
        let requester = requester.clone();
        self.detached(move |this| async move { this.apply_list(&requester).await })
            .await
    }

    async fn apply_list(&self, requester: &Requester) -> Result<Vec<ModelView>, RegistryError> {
        let mut state = self.state.write().await;
        let checkpoint = state.checkpoint();
        state
            .log
            .append(AccessLogEntry::new(AccessAction::List, None, requester));
        self.commit(&mut state, checkpoint).await?;

        state
            .registry
            .list()
            .iter()
            .map(|record| state.view(&record.id))
            .collect()
    }

    /// Applies `changes` to a model, logging an `update`.
    #[tracing::instrument(skip(self, requester))]
    pub async fn update(
        self: &Arc<Self>,
        id: &str,
        changes: ModelUpdate,
        requester: &Requester,
    ) -> Result<ModelView, RegistryError> {
        if changes.status == Some(ModelStatus::Downloading) {
            return Err(RegistryError::InvalidRequest(
                "status 'downloading' is managed by the server".to_string(),
            ));
        }
        let (id, requester) = (id.to_string(), requester.clone());
        self.detached(move |this| async move { this.apply_update(&id, changes, &requester).await })
            .await
    }

    async fn apply_update(
        &self,
        id: &str,
        changes: ModelUpdate,
        requester: &Requester,
    ) -> Result<ModelView, RegistryError> {
        let mut state = self.state.write().await;
        state.ensure_idle(id)?;

        let checkpoint = state.checkpoint();
        state
            .log
            .append(AccessLogEntry::new(AccessAction::Update, Some(id), requester));

        let current = state.registry.get(id).cloned();
        let Ok(mut record) = current else {
            self.commit(&mut state, checkpoint).await?;
            return Err(RegistryError::NotFound(id.to_string()));
        };
        if let Some(status) = changes.status {
            record.status = status;
            if status != ModelStatus::Error {
                record.error = None;
            }
        }
        state.registry.upsert(record);
        self.commit(&mut state, checkpoint).await?;

        state.view(id)
    }

    /// Removes a model from the catalog and its files from disk, logging a
    /// `delete`. Log entries about the model are kept.
    #[tracing::instrument(skip(self, requester))]
    pub async fn delete(
        self: &Arc<Self>,
        id: &str,
        requester: &Requester,
    ) -> Result<ModelRecord, RegistryError> {
        let (id, requester) = (id.to_string(), requester.clone());
        self.detached(move |this| async move { this.apply_delete(&id, &requester).await })
            .await
    }

    async fn apply_delete(
        &self,
        id: &str,
        requester: &Requester,
    ) -> Result<ModelRecord, RegistryError> {
        let mut state = self.state.write().await;
        state.ensure_idle(id)?;

        let checkpoint = state.checkpoint();
        state
            .log
            .append(AccessLogEntry::new(AccessAction::Delete, Some(id), requester));
        let removed = state.registry.get(id).ok().cloned();
        if removed.is_some() {
            state.registry.delete(id);
        }
        self.commit(&mut state, checkpoint).await?;

        let record = removed.ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        // Still under the lock so a new download cannot race the removal.
        if let Err(e) = self.fetcher.remove(Path::new(&record.path)).await {
            tracing::warn!(model = %id, error = %e, "Could not remove model files");
        }
        tracing::info!(model = %id, user = %requester.username, "Model deleted");

        Ok(record)
    }

    /// Returns one model with its stats without logging anything.
    pub async fn inspect(&self, id: &str) -> Result<ModelView, RegistryError> {
        self.state.read().await.view(id)
    }

    /// Usage statistics for `id`, whether or not it is still in the catalog.
    pub async fn model_stats(&self, id: &str) -> ModelStats {
        let state = self.state.read().await;
        stats::model_stats(&state.log, id)
    }

    pub async fn system_stats(&self) -> SystemStats {
        let state = self.state.read().await;
        stats::system_stats(&state.registry, &state.log)
    }
}
