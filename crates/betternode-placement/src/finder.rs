//! Better-node search.
//!
//! Given a pod, the score of its current node and a tolerance, scan the
//! candidate nodes and report one whose score beats the current one by more
//! than the tolerance:
//!
//! ```text
//! candidate_score - tolerance > current_score
//! ```
//!
//! Nodes that fail the candidate filter are never scored. The pod's own
//! node is skipped outright, so a node can never be "better" than itself
//! whatever the tolerance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use betternode_model::{Node, NodeExt, Pod, PodExt};

use crate::error::ConstraintResult;
use crate::filter::{CandidateFilter, Eligibility, PlacementConstraints};
use crate::fit::ResourceFit;

/// Pods bound to each node, captured once per evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    by_node: HashMap<String, Vec<Pod>>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `pods` by their assigned node.
    pub fn from_pods(pods: impl IntoIterator<Item = Pod>) -> Self {
        let mut occupancy = Self::new();
        for pod in pods {
            if pod.node_name().is_empty() {
                continue;
            }
            occupancy
                .by_node
                .entry(pod.node_name().to_string())
                .or_default()
                .push(pod);
        }
        occupancy
    }

    pub fn insert(&mut self, node_name: impl Into<String>, pods: Vec<Pod>) {
        self.by_node.insert(node_name.into(), pods);
    }

    pub fn occupants(&self, node_name: &str) -> &[Pod] {
        self.by_node.get(node_name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.by_node.len()
    }
}

/// Which qualifying candidate to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// First qualifying node in candidate order.
    #[default]
    FirstFit,
    /// Highest-scoring qualifying node; earliest wins ties.
    BestFit,
}

/// A node that beats the pod's current placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetterNode {
    pub node_name: String,
    pub score: i64,
}

/// Scans candidate nodes for a better placement.
pub struct BetterNodeFinder<'a> {
    occupancy: &'a Occupancy,
    filter: CandidateFilter<'a>,
    policy: SelectionPolicy,
}

impl<'a> BetterNodeFinder<'a> {
    pub fn new(occupancy: &'a Occupancy, fit: &'a dyn ResourceFit) -> Self {
        Self {
            occupancy,
            filter: CandidateFilter::new(fit),
            policy: SelectionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Find a node whose preference score exceeds `current_score` by more
    /// than `tolerance`.
    ///
    /// Returns `Ok(None)` when no candidate qualifies. A malformed selector
    /// or affinity term on the pod aborts the scan with an error.
    pub fn find_better(
        &self,
        pod: &Pod,
        current_score: i64,
        tolerance: i64,
        candidates: &[Node],
    ) -> ConstraintResult<Option<BetterNode>> {
        let constraints = PlacementConstraints::from_pod(pod)?;
        Ok(self.find_better_compiled(pod, &constraints, current_score, tolerance, candidates))
    }

    /// [`find_better`](Self::find_better) with constraints compiled by the caller.
    pub fn find_better_compiled(
        &self,
        pod: &Pod,
        constraints: &PlacementConstraints,
        current_score: i64,
        tolerance: i64,
        candidates: &[Node],
    ) -> Option<BetterNode> {
        let mut best: Option<BetterNode> = None;

        for node in candidates {
            if node.name() == pod.node_name() {
                continue;
            }

            let eligibility =
                self.filter
                    .check(pod, constraints, node, self.occupancy.occupants(node.name()));
            if let Eligibility::InsufficientResources(missing) = &eligibility {
                debug!(
                    pod = %pod.pod_ref(),
                    node = %node.name(),
                    missing = ?missing.iter().map(|r| r.resource.as_str()).collect::<Vec<_>>(),
                    "skipping node without required resources"
                );
                continue;
            }
            if !eligibility.is_eligible() {
                debug!(
                    pod = %pod.pod_ref(),
                    node = %node.name(),
                    reason = eligibility.reason(),
                    "skipping node"
                );
                continue;
            }

            let score = constraints.preferred.score(node);
            if score.saturating_sub(tolerance) <= current_score {
                debug!(
                    pod = %pod.pod_ref(),
                    node = %node.name(),
                    score,
                    current_score,
                    tolerance,
                    "node does not beat current placement"
                );
                continue;
            }

            let candidate = BetterNode {
                node_name: node.name().to_string(),
                score,
            };
            match self.policy {
                SelectionPolicy::FirstFit => return Some(candidate),
                SelectionPolicy::BestFit => {
                    if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                        best = Some(candidate);
                    }
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use betternode_model::PreferredSchedulingTerm;

    use crate::error::ConstraintError;
    use crate::fit::NodeResourcesFit;
    use crate::scorer::score;

    const OS: &str = "kubernetes.io/os";
    const INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
    const GPU: &str = "nvidia.com/gpu";

    fn make_node(name: &str, labels: &[(&str, &str)]) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        node
    }

    fn expr(key: &str, values: &[&str]) -> serde_json::Value {
        json!({"matchExpressions": [{"key": key, "operator": "In", "values": values}]})
    }

    /// Pod on "current" that needs linux + p3.2xlarge/c6a.2xlarge and
    /// prefers a GPU.
    fn gpu_pod() -> Pod {
        serde_json::from_value(json!({
            "metadata": {"name": "pod", "namespace": "default"},
            "spec": {
                "nodeName": "current",
                "nodeSelector": {(OS): "linux"},
                "containers": [{"name": "main"}],
                "affinity": {"nodeAffinity": {
                    "requiredDuringSchedulingIgnoredDuringExecution": {
                        "nodeSelectorTerms": [expr(INSTANCE_TYPE, &["p3.2xlarge", "c6a.2xlarge"])]
                    },
                    "preferredDuringSchedulingIgnoredDuringExecution": [
                        {"weight": 100, "preference": expr(GPU, &["true"])},
                        {"weight": 0, "preference": expr("kubernetes.io/arch", &["amd64", "intel"])}
                    ]
                }}
            },
            "status": {"phase": "Running"}
        }))
        .unwrap()
    }

    fn current() -> Node {
        make_node("current", &[(OS, "linux"), (INSTANCE_TYPE, "c6a.2xlarge")])
    }

    fn better() -> Node {
        make_node("better", &[(OS, "linux"), (INSTANCE_TYPE, "p3.2xlarge"), (GPU, "true")])
    }

    fn wrong_os() -> Node {
        make_node("wrong1", &[(OS, "windows"), (INSTANCE_TYPE, "p3.2xlarge"), (GPU, "true")])
    }

    fn wrong_instance_type() -> Node {
        make_node("wrong2", &[(OS, "linux"), (INSTANCE_TYPE, "p3.8xlarge"), (GPU, "true")])
    }

    fn find(
        pod: &Pod,
        current_score: i64,
        tolerance: i64,
        nodes: &[Node],
        policy: SelectionPolicy,
    ) -> Option<BetterNode> {
        let occupancy = Occupancy::new();
        let fit = NodeResourcesFit;
        BetterNodeFinder::new(&occupancy, &fit)
            .with_policy(policy)
            .find_better(pod, current_score, tolerance, nodes)
            .unwrap()
    }

    #[test]
    fn finds_the_gpu_node() {
        let pod = gpu_pod();
        let current_score = score(&current(), pod.preferred_terms()).unwrap();
        assert_eq!(current_score, 0);

        let nodes = vec![current(), better(), wrong_os(), wrong_instance_type()];
        let found = find(&pod, current_score, 0, &nodes, SelectionPolicy::FirstFit);

        assert_eq!(
            found,
            Some(BetterNode {
                node_name: "better".to_string(),
                score: 100
            })
        );
    }

    #[test]
    fn filtered_nodes_are_never_returned() {
        let pod = gpu_pod();
        let nodes = vec![current(), wrong_os(), wrong_instance_type()];

        assert_eq!(find(&pod, 0, 0, &nodes, SelectionPolicy::FirstFit), None);
        assert_eq!(find(&pod, 0, 0, &nodes, SelectionPolicy::BestFit), None);
    }

    #[test]
    fn tolerance_must_be_exceeded() {
        let pod = gpu_pod();
        let nodes = vec![current(), better()];

        assert_eq!(find(&pod, 0, 150, &nodes, SelectionPolicy::FirstFit), None);
        // 100 - 100 is not > 0.
        assert_eq!(find(&pod, 0, 100, &nodes, SelectionPolicy::FirstFit), None);
        assert!(find(&pod, 0, 99, &nodes, SelectionPolicy::FirstFit).is_some());
    }

    #[test]
    fn raising_tolerance_never_finds_more() {
        let pod = gpu_pod();
        let nodes = vec![current(), better(), wrong_os()];

        let mut previous_found = true;
        for tolerance in [0, 50, 99, 100, 150, 1000] {
            let found = find(&pod, 0, tolerance, &nodes, SelectionPolicy::FirstFit).is_some();
            assert!(previous_found || !found, "tolerance {tolerance} found a node after a lower one did not");
            previous_found = found;
        }
    }

    #[test]
    fn first_fit_returns_first_qualifying_node() {
        let mut pod = gpu_pod();
        if let Some(preferred) = pod
            .spec
            .as_mut()
            .and_then(|s| s.affinity.as_mut())
            .and_then(|a| a.node_affinity.as_mut())
            .and_then(|n| n.preferred_during_scheduling_ignored_during_execution.as_mut())
        {
            preferred.push(PreferredSchedulingTerm {
                weight: 100,
                preference: serde_json::from_value(expr("ssd", &["true"])).unwrap(),
            });
        }

        let mut gpu_ssd = better();
        gpu_ssd.metadata.name = Some("gpu-ssd".to_string());
        if let Some(labels) = gpu_ssd.metadata.labels.as_mut() {
            labels.insert("ssd".to_string(), "true".to_string());
        }
        let nodes = vec![current(), better(), gpu_ssd];

        let first = find(&pod, 0, 0, &nodes, SelectionPolicy::FirstFit).unwrap();
        assert_eq!(first.node_name, "better");
        assert_eq!(first.score, 100);

        let best = find(&pod, 0, 0, &nodes, SelectionPolicy::BestFit).unwrap();
        assert_eq!(best.node_name, "gpu-ssd");
        assert_eq!(best.score, 200);
    }

    #[test]
    fn best_fit_keeps_earliest_on_ties() {
        let pod = gpu_pod();
        let mut twin = better();
        twin.metadata.name = Some("twin".to_string());
        let nodes = vec![better(), twin];

        let best = find(&pod, 0, 0, &nodes, SelectionPolicy::BestFit).unwrap();
        assert_eq!(best.node_name, "better");
    }

    #[test]
    fn current_node_is_never_its_own_better_node() {
        let mut pod = gpu_pod();
        if let Some(spec) = pod.spec.as_mut() {
            spec.node_name = Some("better".to_string());
        }

        // Even a negative tolerance cannot make a node beat itself.
        assert_eq!(find(&pod, 100, -50, &[better()], SelectionPolicy::FirstFit), None);
    }

    #[test]
    fn occupied_nodes_are_skipped() {
        let mut pod = gpu_pod();
        if let Some(spec) = pod.spec.as_mut() {
            spec.containers = vec![serde_json::from_value(json!(
                {"name": "main", "resources": {"requests": {"cpu": "2"}}}
            ))
            .unwrap()];
        }

        let mut full: Node = serde_json::from_value(json!({
            "metadata": {"name": "better"},
            "status": {"allocatable": {"cpu": "2"}}
        }))
        .unwrap();
        full.metadata.labels = better().metadata.labels;

        let resident: Pod = serde_json::from_value(json!({
            "metadata": {"name": "resident", "namespace": "default"},
            "spec": {
                "nodeName": "better",
                "containers": [{"name": "main", "resources": {"requests": {"cpu": "2"}}}]
            },
            "status": {"phase": "Running"}
        }))
        .unwrap();

        let occupancy = Occupancy::from_pods(vec![resident]);
        let fit = NodeResourcesFit;
        let found = BetterNodeFinder::new(&occupancy, &fit)
            .find_better(&pod, 0, 0, &[current(), full])
            .unwrap();

        assert_eq!(found, None);
        assert_eq!(occupancy.occupants("better").len(), 1);
        assert!(occupancy.occupants("elsewhere").is_empty());
    }

    #[test]
    fn invalid_constraint_aborts_scan() {
        let mut pod = gpu_pod();
        if let Some(preferred) = pod
            .spec
            .as_mut()
            .and_then(|s| s.affinity.as_mut())
            .and_then(|a| a.node_affinity.as_mut())
            .and_then(|n| n.preferred_during_scheduling_ignored_during_execution.as_mut())
        {
            preferred[0].preference = serde_json::from_value(expr("bad key!", &["x"])).unwrap();
        }

        let occupancy = Occupancy::new();
        let fit = NodeResourcesFit;
        let result = BetterNodeFinder::new(&occupancy, &fit).find_better(&pod, 0, 0, &[better()]);

        assert!(matches!(result, Err(ConstraintError::InvalidLabelKey { .. })));
    }

    #[test]
    fn empty_candidate_set_finds_nothing() {
        let pod = gpu_pod();
        assert_eq!(find(&pod, 0, 0, &[], SelectionPolicy::FirstFit), None);
    }
}
