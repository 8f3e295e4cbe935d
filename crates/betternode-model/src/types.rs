//! Cluster object types.
//!
//! Nodes and pods are the `core/v1` types from `k8s-openapi`, so API
//! responses and snapshot files decode without an intermediate mapping
//! layer. Nearly every field there is optional; [`NodeExt`] and [`PodExt`]
//! read them with the defaults the scheduler assumes.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::ResourceError;
use crate::quantity::Quantity;

pub use k8s_openapi::api::core::v1::{
    Affinity, Container, Node, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, NodeSpec, NodeStatus, Pod, PodSpec, PodStatus, PreferredSchedulingTerm,
    ResourceRequirements,
};
pub use k8s_openapi::apimachinery::pkg::api::resource::Quantity as ApiQuantity;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Resource name → parsed amount (`cpu`, `memory`, `pods`, extended resources).
pub type ResourceList = BTreeMap<String, Quantity>;

/// Resource list as the API carries it.
pub type ApiResourceList = BTreeMap<String, ApiQuantity>;

/// Well-known resource names.
pub mod resources {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
    pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";
    pub const PODS: &str = "pods";
}

static NO_LABELS: BTreeMap<String, String> = BTreeMap::new();

/// Parse every entry of `raw`. The first malformed quantity is an error.
pub fn parse_resources(raw: &ApiResourceList) -> Result<ResourceList, ResourceError> {
    raw.iter()
        .map(|(name, quantity)| {
            let parsed = Quantity::try_from(quantity).map_err(|source| ResourceError {
                resource: name.clone(),
                source,
            })?;
            Ok((name.clone(), parsed))
        })
        .collect()
}

/// Parse `raw`, dropping malformed entries with a warning naming `owner`.
pub fn parse_resources_lossy(raw: &ApiResourceList, owner: &str) -> ResourceList {
    let mut parsed = ResourceList::new();
    for (name, quantity) in raw {
        match Quantity::try_from(quantity) {
            Ok(value) => {
                parsed.insert(name.clone(), value);
            }
            Err(error) => warn!(
                owner,
                resource = %name,
                value = %quantity.0,
                %error,
                "ignoring unparsable quantity"
            ),
        }
    }
    parsed
}

/// Requests declared by one container.
pub fn container_requests(container: &Container) -> Option<&ApiResourceList> {
    container.resources.as_ref()?.requests.as_ref()
}

// ── Node ──────────────────────────────────────────────────────────

pub trait NodeExt {
    fn name(&self) -> &str;

    fn labels(&self) -> &BTreeMap<String, String>;

    /// Cordoned nodes accept no new pods.
    fn is_schedulable(&self) -> bool;

    /// Capacity left for pods after system reservations. Entries that do
    /// not parse are left out.
    fn allocatable(&self) -> ResourceList;
}

impl NodeExt for Node {
    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        self.metadata.labels.as_ref().unwrap_or(&NO_LABELS)
    }

    fn is_schedulable(&self) -> bool {
        !self
            .spec
            .as_ref()
            .and_then(|spec| spec.unschedulable)
            .unwrap_or(false)
    }

    fn allocatable(&self) -> ResourceList {
        self.status
            .as_ref()
            .and_then(|status| status.allocatable.as_ref())
            .map(|raw| parse_resources_lossy(raw, self.name()))
            .unwrap_or_default()
    }
}

// ── Pod ───────────────────────────────────────────────────────────

/// Lifecycle phase of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }

    /// Succeeded and failed pods hold no resources on their node.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl From<&str> for PodPhase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

pub trait PodExt {
    fn namespace(&self) -> &str;

    fn name(&self) -> &str;

    fn uid(&self) -> Option<&str>;

    /// Node the pod is bound to; empty while unscheduled.
    fn node_name(&self) -> &str;

    /// Plain `key=value` selector that node labels must satisfy.
    fn node_selector(&self) -> &BTreeMap<String, String>;

    /// Scheduling priority; pods without a priority class rank as 0.
    fn priority(&self) -> i32;

    /// Reported phase, `None` when the status carries none.
    fn reported_phase(&self) -> Option<PodPhase>;

    fn phase(&self) -> PodPhase {
        self.reported_phase().unwrap_or(PodPhase::Unknown)
    }

    fn containers(&self) -> &[Container];

    fn init_containers(&self) -> &[Container];

    /// Per-pod resource overhead added on top of container requests.
    fn overhead(&self) -> Option<&ApiResourceList>;

    fn node_affinity(&self) -> Option<&NodeAffinity>;

    /// Hard constraint: a node must match at least one term.
    fn required_node_affinity(&self) -> Option<&NodeSelector> {
        self.node_affinity()?
            .required_during_scheduling_ignored_during_execution
            .as_ref()
    }

    /// Soft constraints: matching terms add their weight to a node's score.
    fn preferred_terms(&self) -> &[PreferredSchedulingTerm] {
        self.node_affinity()
            .and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_deref())
            .unwrap_or_default()
    }

    fn has_preferred_terms(&self) -> bool {
        !self.preferred_terms().is_empty()
    }

    fn pod_ref(&self) -> PodRef {
        PodRef {
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
            uid: self.uid().map(str::to_string),
        }
    }

    /// Same object as `other`: uid when both carry one, else namespace/name.
    fn is_same(&self, other: &Self) -> bool {
        match (self.uid(), other.uid()) {
            (Some(a), Some(b)) => a == b,
            _ => self.namespace() == other.namespace() && self.name() == other.name(),
        }
    }
}

impl PodExt for Pod {
    fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    fn node_name(&self) -> &str {
        self.spec
            .as_ref()
            .and_then(|spec| spec.node_name.as_deref())
            .unwrap_or_default()
    }

    fn node_selector(&self) -> &BTreeMap<String, String> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.node_selector.as_ref())
            .unwrap_or(&NO_LABELS)
    }

    fn priority(&self) -> i32 {
        self.spec.as_ref().and_then(|spec| spec.priority).unwrap_or(0)
    }

    fn reported_phase(&self) -> Option<PodPhase> {
        let phase = self.status.as_ref()?.phase.as_deref()?;
        Some(PodPhase::from(phase))
    }

    fn containers(&self) -> &[Container] {
        self.spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default()
    }

    fn init_containers(&self) -> &[Container] {
        self.spec
            .as_ref()
            .and_then(|spec| spec.init_containers.as_deref())
            .unwrap_or_default()
    }

    fn overhead(&self) -> Option<&ApiResourceList> {
        self.spec.as_ref()?.overhead.as_ref()
    }

    fn node_affinity(&self) -> Option<&NodeAffinity> {
        self.spec.as_ref()?.affinity.as_ref()?.node_affinity.as_ref()
    }
}

/// Identity of a pod as used for logging and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    /// Observed uid, used as a delete precondition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
