//! Client for a Hugging Face compatible model hub.
//!
//! Lists the files of a model repository through `/api/models/{name}` and
//! downloads each one from `/{name}/resolve/main/{file}` into
//! `<mount_point>/<id>/`. Files already on disk are skipped, so a repeated
//! fetch resumes where the previous one stopped. Each file is written to a
//! `.part` sibling and renamed once complete.

use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use ureq::{Agent, AgentBuilder};

use super::{FetchError, FetchedArtifact, ModelFetcher};
use crate::models::model_id_for;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(300);
const HUB_REVISION: &str = "main";

#[derive(Debug, Deserialize)]
struct HubModelInfo {
    #[serde(default)]
    siblings: Vec<HubSibling>,
}

#[derive(Debug, Deserialize)]
struct HubSibling {
    rfilename: String,
}

/// Fetches models from a hub over HTTP.
#[derive(Clone)]
pub struct HubFetcher {
    agent: Agent,
    endpoint: String,
    token: Option<String>,
    mount_point: PathBuf,
}

impl HubFetcher {
    pub fn new(endpoint: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .user_agent(concat!("modelvault/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: None,
            mount_point: mount_point.into(),
        }
    }

    /// Sets the bearer token sent with every hub request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn fetch_blocking(&self, name: &str) -> Result<FetchedArtifact, FetchError> {
        let id = model_id_for(name).map_err(|_| FetchError::NotFound(name.to_string()))?;
        let dest = self.mount_point.join(id);
        fs::create_dir_all(&dest)?;

        let info: HubModelInfo = self
            .get(&format!("{}/api/models/{}", self.endpoint, name), name)?
            .into_json()
            .map_err(|e| FetchError::Network(format!("invalid hub response: {}", e)))?;

        for sibling in &info.siblings {
            let relative = safe_relative_path(&sibling.rfilename).ok_or_else(|| {
                FetchError::Network(format!("hub listed unsafe file name '{}'", sibling.rfilename))
            })?;
            let target = dest.join(relative);
            if target.is_file() {
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let url = format!(
                "{}/{}/resolve/{}/{}",
                self.endpoint, name, HUB_REVISION, sibling.rfilename
            );
            let response = self.get(&url, name)?;
            download_to(response, &target)?;
            tracing::debug!(model = %name, file = %sibling.rfilename, "Fetched file");
        }

        let size_bytes = dir_size(&dest)?;
        Ok(FetchedArtifact {
            path: dest,
            size_bytes,
        })
    }

    fn get(&self, url: &str, name: &str) -> Result<ureq::Response, FetchError> {
        let mut request = self.agent.get(url);
        if let Some(ref token) = self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        request.call().map_err(|e| match e {
            ureq::Error::Status(404, _) => FetchError::NotFound(name.to_string()),
            ureq::Error::Status(401 | 403, _) => FetchError::AuthRequired(name.to_string()),
            ureq::Error::Status(code, _) => {
                FetchError::Network(format!("hub returned HTTP {} for {}", code, url))
            }
            ureq::Error::Transport(t) => FetchError::Network(t.to_string()),
        })
    }
}

#[async_trait]
impl ModelFetcher for HubFetcher {
    async fn fetch(&self, name: &str) -> Result<FetchedArtifact, FetchError> {
        let fetcher = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || fetcher.fetch_blocking(&name))
            .await
            .map_err(|e| FetchError::Io(io::Error::other(format!("fetch task failed: {}", e))))?
    }

    async fn remove(&self, path: &Path) -> Result<(), FetchError> {
        let escapes = path.components().any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.mount_point) || path == self.mount_point {
            return Err(FetchError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to remove {} outside the mount point", path.display()),
            )));
        }
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn download_to(response: ureq::Response, target: &Path) -> Result<(), FetchError> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = target.with_file_name(format!(".{}.part", file_name));

    let mut reader = response.into_reader();
    let mut file = fs::File::create(&partial)?;
    io::copy(&mut reader, &mut file)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&partial, target)?;
    Ok(())
}

/// Accepts only plain relative paths made of normal components.
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() || name.contains('\\') {
        return None;
    }
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| path.to_path_buf())
}

/// Total size of regular files below `path`. Symlinks are not followed.
fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.path().symlink_metadata()?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                total += meta.len();
            }
        }
    }
    Ok(total)
}
