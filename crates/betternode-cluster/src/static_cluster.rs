//! In-memory cluster backed by a snapshot file.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use betternode_model::{Node, NodeExt, Pod, PodExt, PodRef};

use crate::client::{ClusterClient, PodFieldSelector};
use crate::error::{ClusterError, ClusterResult};

/// `{"nodes": [...], "pods": [...]}`, each item a `core/v1` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl ClusterSnapshot {
    pub fn from_json_str(json: &str) -> ClusterResult<Self> {
        serde_json::from_str(json).map_err(|e| ClusterError::decode("cluster snapshot", e))
    }

    pub fn from_file(path: &Path) -> ClusterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ClusterError::io(path, e))?;
        Self::from_json_str(&content)
    }
}

#[derive(Debug, Default)]
struct State {
    snapshot: ClusterSnapshot,
    deleted: Vec<PodRef>,
}

/// [`ClusterClient`] over a fixed snapshot. Deletions remove the pod from
/// the snapshot and are recorded in order.
#[derive(Debug, Default)]
pub struct StaticCluster {
    state: RwLock<State>,
}

impl StaticCluster {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            state: RwLock::new(State {
                snapshot,
                deleted: Vec::new(),
            }),
        }
    }

    pub fn from_file(path: &Path) -> ClusterResult<Self> {
        Ok(Self::new(ClusterSnapshot::from_file(path)?))
    }

    /// Pods deleted so far, oldest first.
    pub async fn deleted(&self) -> Vec<PodRef> {
        self.state.read().await.deleted.clone()
    }

    /// Current contents, minus anything deleted.
    pub async fn snapshot(&self) -> ClusterSnapshot {
        self.state.read().await.snapshot.clone()
    }
}

#[async_trait]
impl ClusterClient for StaticCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        Ok(self.state.read().await.snapshot.nodes.clone())
    }

    async fn get_node(&self, name: &str) -> ClusterResult<Node> {
        self.state
            .read()
            .await
            .snapshot
            .nodes
            .iter()
            .find(|n| n.name() == name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("node {name}")))
    }

    async fn list_pods(&self, selector: &PodFieldSelector) -> ClusterResult<Vec<Pod>> {
        let state = self.state.read().await;
        Ok(state
            .snapshot
            .pods
            .iter()
            .filter(|p| selector.matches(p))
            .cloned()
            .collect())
    }

    async fn delete_pod(&self, pod: &PodRef) -> ClusterResult<()> {
        let mut state = self.state.write().await;

        let Some(index) = state
            .snapshot
            .pods
            .iter()
            .position(|p| p.namespace() == pod.namespace && p.name() == pod.name)
        else {
            debug!(pod = %pod, "pod already gone");
            return Ok(());
        };

        if let (Some(expected), Some(actual)) = (pod.uid.as_deref(), state.snapshot.pods[index].uid()) {
            if expected != actual {
                return Err(ClusterError::PreconditionFailed(pod.to_string()));
            }
        }

        state.snapshot.pods.remove(index);
        state.deleted.push(pod.clone());
        Ok(())
    }
}
