//! Eviction driver error types.

use thiserror::Error;

use betternode_cluster::ClusterError;
use betternode_model::PodRef;
use betternode_placement::ConstraintError;

/// Errors that end (or, under [`ErrorPolicy::SkipWorkload`](crate::ErrorPolicy::SkipWorkload), skip) an evaluation.
#[derive(Debug, Error)]
pub enum EvictError {
    #[error("invalid placement constraint on pod {pod}: {source}")]
    InvalidConstraint {
        pod: PodRef,
        #[source]
        source: ConstraintError,
    },

    #[error("cluster snapshot unavailable: {0}")]
    SnapshotUnavailable(#[source] ClusterError),

    #[error("failed to delete pod {pod}: {source}")]
    DeletionFailed {
        pod: PodRef,
        #[source]
        source: ClusterError,
    },
}

pub type EvictResult<T> = Result<T, EvictError>;
