//! Optional TOML run configuration. Command-line flags override it.
//!
//! ```toml
//! [eviction]
//! dry-run = true
//! tolerance = 20
//! on-error = "skip-workload"
//! selection = "best-fit"
//!
//! [connection]
//! kubeconfig = "/etc/kube/config"
//! context = "prod"
//! timeout-secs = 10
//!
//! [log]
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use betternode_evictor::EvictorConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub eviction: EvictorConfig,
    pub connection: ConnectionSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConnectionSection {
    /// Read the cluster from a snapshot file instead of an API server.
    pub snapshot: Option<PathBuf>,
    pub server: Option<String>,
    pub token_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: Option<bool>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub format: LogFormat,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: RunConfig = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.eviction.tolerance >= 0,
            "tolerance must be non-negative, got {}",
            self.eviction.tolerance
        );
        if let Some(server) = &self.connection.server {
            anyhow::ensure!(
                server.starts_with("https://") || server.starts_with("http://"),
                "server must be an http(s) URL, got {server:?}"
            );
        }
        Ok(())
    }
}
