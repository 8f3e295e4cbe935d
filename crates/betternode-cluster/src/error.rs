//! Cluster access error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or mutating cluster state.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster connection: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("API server returned {status} {reason}: {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// The object changed since it was observed (uid precondition failed).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid connection config: {0}")]
    Config(String),
}

impl ClusterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Classify a failed request about `what`. Missing objects and uid
    /// conflicts get their own variants; other API failures keep the
    /// server's status and reason.
    pub(crate) fn from_request(what: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => match response.code {
                404 => Self::NotFound(what.to_string()),
                409 => Self::PreconditionFailed(what.to_string()),
                status => Self::Api {
                    status,
                    reason: response.reason,
                    message: response.message,
                },
            },
            kube::Error::SerdeError(err) => Self::decode(what, err),
            other => Self::Kube(other),
        }
    }
}

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
