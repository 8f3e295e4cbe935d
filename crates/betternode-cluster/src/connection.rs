//! API server connection settings.
//!
//! Resolution order, first match wins:
//!
//! 1. an explicit `server` URL, optionally with a bearer token file
//! 2. an explicit kubeconfig file, at `context` or its current context
//! 3. a `context` in the default kubeconfig (`$KUBECONFIG`, merged, or `~/.kube/config`)
//! 4. `kube`'s inference: the default kubeconfig, else the in-cluster service account
//!
//! Kubeconfig handling is `kube`'s own, exec credential plugins included.

use std::path::PathBuf;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};

/// Where to find the API server and how to authenticate against it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Base URL, e.g. `https://10.0.0.1:6443`. Skips kubeconfig discovery.
    pub server: Option<String>,
    /// Bearer token file for `server`, re-read as it rotates.
    pub token_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    /// Connect and read timeout per request.
    pub timeout: Option<Duration>,
}

impl ConnectionOptions {
    pub async fn resolve(&self) -> ClusterResult<kube::Config> {
        let mut config = match (&self.server, &self.kubeconfig) {
            (Some(server), _) => {
                debug!(%server, "using explicit server");
                let mut config = kube::Config::new(server.parse().map_err(|e| {
                    ClusterError::Config(format!("invalid server URL {server:?}: {e}"))
                })?);
                config.auth_info.token_file = self
                    .token_file
                    .as_ref()
                    .map(|path| path.display().to_string());
                config
            }
            (None, Some(path)) => {
                debug!(path = %path.display(), context = ?self.context, "using explicit kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path)?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &self.kubeconfig_options()).await?
            }
            (None, None) if self.context.is_some() => {
                debug!(context = ?self.context, "using default kubeconfig");
                kube::Config::from_kubeconfig(&self.kubeconfig_options()).await?
            }
            (None, None) => {
                debug!("inferring cluster connection");
                kube::Config::infer().await?
            }
        };

        if self.insecure_skip_tls_verify {
            config.accept_invalid_certs = true;
        }
        if let Some(timeout) = self.timeout {
            config.connect_timeout = Some(timeout);
            config.read_timeout = Some(timeout);
        }
        Ok(config)
    }

    fn kubeconfig_options(&self) -> KubeConfigOptions {
        KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        }
    }
}
