//! betternode-cluster: access to the cluster being audited.
//!
//! Everything that performs I/O against cluster state lives here, behind the
//! [`ClusterClient`] trait:
//!
//! - [`KubeApiClient`] talks to a Kubernetes API server through `kube`
//! - [`StaticCluster`] serves a snapshot file, for offline audits and tests
//!
//! The [`snapshot`] module builds the listings an evaluation pass needs on
//! top of any client: schedulable nodes, rebalance candidates and per-node
//! occupants.

pub mod api;
pub mod client;
pub mod connection;
pub mod error;
pub mod snapshot;
pub mod static_cluster;

pub use api::KubeApiClient;
pub use client::{ClusterClient, PodFieldSelector};
pub use connection::ConnectionOptions;
pub use error::{ClusterError, ClusterResult};
pub use static_cluster::{ClusterSnapshot, StaticCluster};
