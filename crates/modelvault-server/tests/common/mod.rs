//! Shared helpers for modelvault integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use modelvault_server::models::{model_id_for, ModelView, Requester};
use modelvault_server::{Coordinator, FetchError, FetchedArtifact, JsonStore, ModelFetcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch double with scripted outcomes. Never touches the network or disk.
pub struct ScriptedFetcher {
    root: PathBuf,
    size_bytes: u64,
    delay: Duration,
    failures_left: AtomicUsize,
    hang: bool,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    removed: Mutex<Vec<PathBuf>>,
}

impl ScriptedFetcher {
    /// Every fetch succeeds with `size_bytes`.
    pub fn succeeding(root: &Path, size_bytes: u64) -> Self {
        Self {
            root: root.to_path_buf(),
            size_bytes,
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            hang: false,
            gate: None,
            calls: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch fails with `FetchError::NotFound`.
    pub fn failing(root: &Path) -> Self {
        Self::succeeding(root, 0).failing_times(usize::MAX)
    }

    /// Every fetch never completes.
    pub fn hanging(root: &Path) -> Self {
        Self {
            hang: true,
            ..Self::succeeding(root, 0)
        }
    }

    /// The first `times` fetches fail, later ones succeed.
    pub fn failing_times(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fetches block until the test adds a permit to `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelFetcher for ScriptedFetcher {
    async fn fetch(&self, name: &str) -> Result<FetchedArtifact, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if should_fail {
            return Err(FetchError::NotFound(name.to_string()));
        }

        Ok(FetchedArtifact {
            path: self.root.join(model_id_for(name).expect("valid name")),
            size_bytes: self.size_bytes,
        })
    }

    async fn remove(&self, path: &Path) -> Result<(), FetchError> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

pub async fn open_coordinator(
    root: &Path,
    fetcher: Arc<ScriptedFetcher>,
    fetch_timeout: Duration,
) -> Arc<Coordinator> {
    let store = JsonStore::open(root).await.expect("Failed to open store");
    let coordinator = Coordinator::open(store, fetcher, fetch_timeout)
        .await
        .expect("Failed to open coordinator");
    Arc::new(coordinator)
}

pub fn requester(username: &str, ip: &str) -> Requester {
    Requester::new(username, ip)
}

/// Polls until `id` is in the catalog with the given status.
pub async fn wait_for_status(coordinator: &Coordinator, id: &str, status: &str) -> ModelView {
    for _ in 0..500 {
        if let Ok(view) = coordinator.inspect(id).await {
            if view.record.status.as_str() == status {
                return view;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("model '{}' never reached status '{}'", id, status);
}
