//! Candidate filter: hard constraints a node must satisfy.
//!
//! Steps run in a fixed order and stop at the first failure:
//! 1. the pod's plain `nodeSelector`
//! 2. the pod's required node affinity
//! 3. resource fit against non-terminal, equal-or-higher-priority occupants
//!
//! Lower-priority occupants are left out of the capacity accounting because
//! the pod could preempt them.

use betternode_model::{Node, NodeExt, Pod, PodExt, ResourceList};

use crate::error::ConstraintResult;
use crate::fit::{InsufficientResource, NodeResourcesFit, ResourceFit, pod_requests};
use crate::scorer::PreferredTerms;
use crate::selector::{NodeSelectorMatcher, PlainSelector};

/// A pod's placement constraints, compiled once and reused across nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementConstraints {
    pub selector: PlainSelector,
    pub required: Option<NodeSelectorMatcher>,
    pub preferred: PreferredTerms,
    /// Effective request the pod needs on any candidate.
    pub requests: ResourceList,
}

impl PlacementConstraints {
    pub fn from_pod(pod: &Pod) -> ConstraintResult<Self> {
        let selector = PlainSelector::from_labels(pod.node_selector());
        let required = pod
            .required_node_affinity()
            .map(NodeSelectorMatcher::compile)
            .transpose()?;
        let preferred = PreferredTerms::compile(pod.preferred_terms())?;
        let requests = pod_requests(pod)?;
        Ok(Self {
            selector,
            required,
            preferred,
            requests,
        })
    }
}

/// Outcome of filtering one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    SelectorMismatch,
    RequiredAffinityMismatch,
    InsufficientResources(Vec<InsufficientResource>),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    /// Short reason for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Eligibility::Eligible => "eligible",
            Eligibility::SelectorMismatch => "node selector mismatch",
            Eligibility::RequiredAffinityMismatch => "required node affinity mismatch",
            Eligibility::InsufficientResources(_) => "insufficient resources",
        }
    }
}

/// Applies the hard constraints with a pluggable resource-fit check.
#[derive(Clone, Copy)]
pub struct CandidateFilter<'a> {
    fit: &'a dyn ResourceFit,
}

impl<'a> CandidateFilter<'a> {
    pub fn new(fit: &'a dyn ResourceFit) -> Self {
        Self { fit }
    }

    /// Check `node` for `pod`. `occupants` are the pods currently bound to
    /// the node; terminal and lower-priority ones are ignored here.
    pub fn check(
        &self,
        pod: &Pod,
        constraints: &PlacementConstraints,
        node: &Node,
        occupants: &[Pod],
    ) -> Eligibility {
        if !constraints.selector.matches(node.labels()) {
            return Eligibility::SelectorMismatch;
        }

        if let Some(required) = &constraints.required {
            if !required.matches(node) {
                return Eligibility::RequiredAffinityMismatch;
            }
        }

        let priority = pod.priority();
        let counted: Vec<&Pod> = occupants
            .iter()
            .filter(|o| !o.phase().is_terminal() && o.priority() >= priority && !o.is_same(pod))
            .collect();

        let insufficient = self
            .fit
            .insufficient_resources(&constraints.requests, node, &counted);
        if !insufficient.is_empty() {
            return Eligibility::InsufficientResources(insufficient);
        }

        Eligibility::Eligible
    }
}

/// One-shot eligibility check with the default resource fit.
pub fn eligible(pod: &Pod, node: &Node, occupants: &[Pod]) -> ConstraintResult<bool> {
    let constraints = PlacementConstraints::from_pod(pod)?;
    let fit = NodeResourcesFit;
    Ok(CandidateFilter::new(&fit)
        .check(pod, &constraints, node, occupants)
        .is_eligible())
}
