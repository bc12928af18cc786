//! Blocking HTTP client for the modelvault server API.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// A model as returned by the server, with its usage stats.
#[derive(Debug, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
    pub status: String,
    pub downloaded_at: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stats: ModelStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelStats {
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub total_requests: u64,
    pub first_downloaded_by: Option<String>,
    pub first_downloaded_at: Option<String>,
    pub first_downloaded_from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Activity {
    pub action: String,
    pub username: String,
    pub ip_address: String,
}

#[derive(Debug, Deserialize)]
pub struct SystemStats {
    pub total_models: u64,
    pub total_size_bytes: u64,
    pub total_requests: u64,
    pub unique_users: u64,
    #[serde(default)]
    pub recent_activity: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadResult {
    pub model: Model,
    #[serde(default)]
    pub already_exists: bool,
}

#[derive(Deserialize)]
struct ModelEnvelope {
    model: Model,
}

#[derive(Deserialize)]
struct ModelsEnvelope {
    models: Vec<Model>,
}

#[derive(Deserialize)]
struct StatsEnvelope {
    stats: SystemStats,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
}

pub struct ApiClient {
    agent: ureq::Agent,
    api_base: String,
}

impl ApiClient {
    pub fn new(server: &str) -> Self {
        // Downloads block until the hub fetch settles, so no read timeout.
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .build();
        Self {
            agent,
            api_base: format!("{}/api", server.trim_end_matches('/')),
        }
    }

    pub fn list_models(&self) -> Result<Vec<Model>> {
        let envelope: ModelsEnvelope = self.send(self.agent.get(&self.url("/models")), None)?;
        Ok(envelope.models)
    }

    pub fn get_model(&self, id: &str) -> Result<Model> {
        let envelope: ModelEnvelope =
            self.send(self.agent.get(&self.url(&format!("/models/{}", id))), None)?;
        Ok(envelope.model)
    }

    pub fn download_model(&self, name: &str, username: &str) -> Result<DownloadResult> {
        let body = json!({ "model_name": name, "username": username });
        self.send(self.agent.post(&self.url("/models/download")), Some(body))
    }

    /// Sets the status of a model (`ready` or `error`).
    pub fn update_model(&self, id: &str, status: &str, username: &str) -> Result<Model> {
        let body = json!({ "status": status, "username": username });
        let envelope: ModelEnvelope =
            self.send(self.agent.put(&self.url(&format!("/models/{}", id))), Some(body))?;
        Ok(envelope.model)
    }

    pub fn delete_model(&self, id: &str, username: &str) -> Result<()> {
        let request = self
            .agent
            .delete(&self.url(&format!("/models/{}", id)))
            .set("X-Username", username);
        let _: serde_json::Value = self.send(request, None)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<SystemStats> {
        let envelope: StatsEnvelope = self.send(self.agent.get(&self.url("/stats")), None)?;
        Ok(envelope.stats)
    }

    pub fn health(&self) -> Result<bool> {
        let body: serde_json::Value = self.send(self.agent.get(&self.url("/health")), None)?;
        Ok(body["success"].as_bool().unwrap_or(false))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: ureq::Request,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match result {
            Ok(response) => response
                .into_json()
                .context("Failed to parse server response"),
            Err(ureq::Error::Status(code, response)) => {
                let message = response
                    .into_json::<ErrorEnvelope>()
                    .ok()
                    .and_then(|e| e.error)
                    .unwrap_or_else(|| format!("server returned HTTP {}", code));
                bail!("{}", message)
            }
            Err(ureq::Error::Transport(e)) => Err(anyhow!("Failed to reach server: {}", e)),
        }
    }
}
