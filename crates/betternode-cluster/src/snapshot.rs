//! Listings an evaluation pass is built from.

use tracing::debug;

use betternode_model::{Node, NodeExt, Pod, PodExt};

use crate::client::{ClusterClient, PodFieldSelector};
use crate::error::ClusterResult;

/// Nodes that accept new pods. Cordoned nodes are dropped.
pub async fn schedulable_nodes(client: &dyn ClusterClient) -> ClusterResult<Vec<Node>> {
    let nodes = client.list_nodes().await?;
    Ok(nodes
        .into_iter()
        .filter(|node| {
            let schedulable = node.is_schedulable();
            if !schedulable {
                debug!(node = %node.name(), "skipping unschedulable node");
            }
            schedulable
        })
        .collect())
}

/// Running pods that declare at least one preferred node affinity term.
pub async fn rebalance_candidates(client: &dyn ClusterClient) -> ClusterResult<Vec<Pod>> {
    let pods = client.list_pods(&PodFieldSelector::active()).await?;
    Ok(pods
        .into_iter()
        .filter(|pod| {
            let has_preferences = pod.has_preferred_terms();
            if !has_preferences {
                debug!(
                    pod = %pod.pod_ref(),
                    "skipping pod without preferred node affinity"
                );
            }
            has_preferences
        })
        .collect())
}

/// Running pods bound to `node_name`.
pub async fn pods_on_node(client: &dyn ClusterClient, node_name: &str) -> ClusterResult<Vec<Pod>> {
    client
        .list_pods(&PodFieldSelector::active().on_node(node_name))
        .await
}
