//! The cluster client seam.

use async_trait::async_trait;

use betternode_model::{Node, Pod, PodExt, PodPhase, PodRef};

use crate::error::ClusterResult;

/// Read and delete operations an evaluation pass needs from a cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// All nodes, schedulable or not.
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>>;

    /// One node by name. Missing nodes are [`ClusterError::NotFound`](crate::ClusterError::NotFound).
    async fn get_node(&self, name: &str) -> ClusterResult<Node>;

    /// Pods across all namespaces matching `selector`.
    async fn list_pods(&self, selector: &PodFieldSelector) -> ClusterResult<Vec<Pod>>;

    /// Request removal of a pod. Deleting a pod that is already gone
    /// succeeds; a uid mismatch is [`ClusterError::PreconditionFailed`](crate::ClusterError::PreconditionFailed).
    async fn delete_pod(&self, pod: &PodRef) -> ClusterResult<()>;
}

/// Server-side pod filter, rendered as a Kubernetes `fieldSelector`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodFieldSelector {
    pub excluded_phases: Vec<PodPhase>,
    pub node_name: Option<String>,
}

impl PodFieldSelector {
    /// Pods that are bound and running: not succeeded, failed or pending.
    pub fn active() -> Self {
        Self {
            excluded_phases: vec![PodPhase::Succeeded, PodPhase::Failed, PodPhase::Pending],
            node_name: None,
        }
    }

    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// `status.phase!=Succeeded,...,spec.nodeName=<node>`
    pub fn to_query(&self) -> String {
        let mut parts: Vec<String> = self
            .excluded_phases
            .iter()
            .map(|p| format!("status.phase!={}", p.as_str()))
            .collect();
        if let Some(node) = &self.node_name {
            parts.push(format!("spec.nodeName={node}"));
        }
        parts.join(",")
    }

    /// Client-side evaluation, for backends without a server.
    pub fn matches(&self, pod: &Pod) -> bool {
        if let Some(phase) = pod.reported_phase() {
            if self.excluded_phases.contains(&phase) {
                return false;
            }
        }
        self.node_name
            .as_deref()
            .is_none_or(|node| pod.node_name() == node)
    }
}
