//! Server configuration from command-line flags and environment.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// modelvault server - model catalog with usage tracking
#[derive(Debug, Clone, Parser)]
#[command(name = "modelvault-server")]
#[command(version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "MODELVAULT_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Directory holding the catalog documents and downloaded models
    #[arg(long, env = "MODELS_MOUNT_POINT", default_value = "./models")]
    pub mount_point: PathBuf,

    /// Upper bound for a single model fetch, in seconds
    #[arg(long, env = "MODELVAULT_FETCH_TIMEOUT_SECS", default_value_t = 3600)]
    pub fetch_timeout_secs: u64,

    /// Base URL of the model hub
    #[arg(long, env = "HF_ENDPOINT", default_value = "https://huggingface.co")]
    pub hub_endpoint: String,

    /// Access token for gated or private models
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hub_token: Option<String>,
}

impl ServerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
