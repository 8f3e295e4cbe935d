//! Eviction driver.
//!
//! One pass over a cluster snapshot:
//!
//! ```text
//! schedulable nodes + rebalance candidates + occupants per node
//!   └── for each candidate pod
//!       ├── score its current node
//!       ├── look for a better node among the schedulable ones
//!       └── delete the pod (unless dry-run) so the scheduler re-places it
//! ```
//!
//! The pass is sequential and acts on what it listed at the start. Listing
//! and deletion failures end the pass. Invalid constraints end it too under
//! [`ErrorPolicy::FailFast`].

use serde::Serialize;
use tracing::{debug, info, warn};

use betternode_cluster::{ClusterClient, ClusterError, snapshot};
use betternode_model::{Node, NodeExt, Pod, PodExt, PodRef};
use betternode_placement::{BetterNodeFinder, NodeResourcesFit, Occupancy, PlacementConstraints};

use crate::config::{ErrorPolicy, EvictorConfig};
use crate::error::{EvictError, EvictResult};

/// A pod found on a dominated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub pod: PodRef,
    pub current_node: String,
    pub current_score: i64,
    pub target_node: String,
    pub target_score: i64,
    /// Deleted in this pass. Always false in dry-run mode.
    pub evicted: bool,
}

/// A pod left alone because it could not be evaluated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub pod: PodRef,
    pub reason: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub evaluated: usize,
    pub decisions: Vec<Decision>,
    pub skipped: Vec<Skipped>,
}

impl RunReport {
    pub fn evicted(&self) -> usize {
        self.decisions.iter().filter(|d| d.evicted).count()
    }

    /// Nothing was found on a dominated node.
    pub fn is_noop(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Runs evaluation passes against a cluster.
pub struct Evictor<'a> {
    client: &'a dyn ClusterClient,
    config: EvictorConfig,
    fit: NodeResourcesFit,
}

impl<'a> Evictor<'a> {
    pub fn new(client: &'a dyn ClusterClient, config: EvictorConfig) -> Self {
        Self {
            client,
            config,
            fit: NodeResourcesFit,
        }
    }

    pub fn config(&self) -> &EvictorConfig {
        &self.config
    }

    /// Evaluate every rebalance candidate once.
    pub async fn run(&self) -> EvictResult<RunReport> {
        let nodes = snapshot::schedulable_nodes(self.client)
            .await
            .map_err(EvictError::SnapshotUnavailable)?;
        let pods = snapshot::rebalance_candidates(self.client)
            .await
            .map_err(EvictError::SnapshotUnavailable)?;

        info!(
            nodes = nodes.len(),
            pods = pods.len(),
            dry_run = self.config.dry_run,
            tolerance = self.config.tolerance,
            "starting evaluation pass"
        );

        let mut report = RunReport::default();
        if pods.is_empty() {
            info!("no pods to evict");
            return Ok(report);
        }

        let occupancy = self.load_occupancy(&nodes).await?;

        for pod in &pods {
            report.evaluated += 1;
            match self.evaluate(pod, &nodes, &occupancy).await {
                Ok(Some(decision)) => self.act(decision, &mut report).await?,
                Ok(None) => {}
                Err(err @ EvictError::InvalidConstraint { .. })
                    if self.config.on_error == ErrorPolicy::SkipWorkload =>
                {
                    warn!(pod = %pod.pod_ref(), error = %err, "skipping pod");
                    report.skipped.push(Skipped {
                        pod: pod.pod_ref(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        if report.is_noop() {
            info!(evaluated = report.evaluated, "no pods to evict");
        } else {
            info!(
                evaluated = report.evaluated,
                decisions = report.decisions.len(),
                evicted = report.evicted(),
                skipped = report.skipped.len(),
                "evaluation pass finished"
            );
        }
        Ok(report)
    }

    async fn load_occupancy(&self, nodes: &[Node]) -> EvictResult<Occupancy> {
        let mut occupancy = Occupancy::new();
        for node in nodes {
            let pods = snapshot::pods_on_node(self.client, node.name())
                .await
                .map_err(EvictError::SnapshotUnavailable)?;
            debug!(node = %node.name(), occupants = pods.len(), "listed occupants");
            occupancy.insert(node.name(), pods);
        }
        Ok(occupancy)
    }

    /// Find a better node for `pod`, if there is one.
    async fn evaluate(
        &self,
        pod: &Pod,
        nodes: &[Node],
        occupancy: &Occupancy,
    ) -> EvictResult<Option<Decision>> {
        let constraints =
            PlacementConstraints::from_pod(pod).map_err(|source| EvictError::InvalidConstraint {
                pod: pod.pod_ref(),
                source,
            })?;

        // Fetched by name: the current node may be cordoned and absent from `nodes`.
        let current = self
            .client
            .get_node(pod.node_name())
            .await
            .map_err(EvictError::SnapshotUnavailable)?;
        let current_score = constraints.preferred.score(&current);

        let finder = BetterNodeFinder::new(occupancy, &self.fit).with_policy(self.config.selection);
        let better = finder.find_better_compiled(
            pod,
            &constraints,
            current_score,
            self.config.tolerance,
            nodes,
        );

        let Some(better) = better else {
            debug!(
                pod = %pod.pod_ref(),
                node = %current.name(),
                score = current_score,
                "no better node"
            );
            return Ok(None);
        };

        Ok(Some(Decision {
            pod: pod.pod_ref(),
            current_node: current.name().to_string(),
            current_score,
            target_node: better.node_name,
            target_score: better.score,
            evicted: false,
        }))
    }

    async fn act(&self, mut decision: Decision, report: &mut RunReport) -> EvictResult<()> {
        info!(
            pod = %decision.pod,
            node = %decision.current_node,
            score = decision.current_score,
            target = %decision.target_node,
            target_score = decision.target_score,
            dry_run = self.config.dry_run,
            "found better node"
        );

        if !self.config.dry_run {
            match self.client.delete_pod(&decision.pod).await {
                Ok(()) => {
                    info!(pod = %decision.pod, "evicted pod");
                    decision.evicted = true;
                }
                Err(ClusterError::PreconditionFailed(_)) => {
                    warn!(pod = %decision.pod, "pod changed since snapshot, not evicted");
                    report.skipped.push(Skipped {
                        pod: decision.pod.clone(),
                        reason: "pod changed since snapshot".to_string(),
                    });
                }
                Err(source) => {
                    return Err(EvictError::DeletionFailed {
                        pod: decision.pod,
                        source,
                    });
                }
            }
        }

        report.decisions.push(decision);
        Ok(())
    }
}
