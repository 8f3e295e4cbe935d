//! Resource-fit accounting.
//!
//! Decides whether a pod's requests fit on a node next to the pods already
//! bound there. Which occupants count is the caller's business (the
//! candidate filter passes only equal-or-higher-priority pods); this module
//! only does the arithmetic:
//!
//! - pod request = max(sum of containers, largest init container) + overhead
//! - a node's declared `pods` allocatable caps the occupant count
//! - every requested resource must satisfy `requested + used <= allocatable`

use std::convert::Infallible;
use std::fmt;

use betternode_model::{
    ApiResourceList, Node, NodeExt, Pod, PodExt, Quantity, ResourceError, ResourceList,
    container_requests, parse_resources, parse_resources_lossy, resources,
};

/// One resource dimension a pod would overflow on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientResource {
    pub resource: String,
    pub requested: Quantity,
    pub used: Quantity,
    pub capacity: Quantity,
}

impl fmt::Display for InsufficientResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insufficient {} (requested {}, used {}, allocatable {})",
            self.resource, self.requested, self.used, self.capacity
        )
    }
}

/// Capacity check behind the candidate filter's third step.
pub trait ResourceFit {
    /// Resources a pod requesting `request` would overflow on `node` given
    /// `occupants` already placed there. Empty means the pod fits.
    fn insufficient_resources(
        &self,
        request: &ResourceList,
        node: &Node,
        occupants: &[&Pod],
    ) -> Vec<InsufficientResource>;
}

/// Default fit check mirroring the scheduler's node-resources filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeResourcesFit;

impl ResourceFit for NodeResourcesFit {
    fn insufficient_resources(
        &self,
        request: &ResourceList,
        node: &Node,
        occupants: &[&Pod],
    ) -> Vec<InsufficientResource> {
        let allocatable = node.allocatable();
        let mut insufficient = Vec::new();

        if let Some(allowed) = allocatable.get(resources::PODS) {
            let used = Quantity::from_units(occupants.len() as i64);
            let requested = Quantity::from_units(1);
            if used.saturating_add(requested) > *allowed {
                insufficient.push(InsufficientResource {
                    resource: resources::PODS.to_string(),
                    requested,
                    used,
                    capacity: *allowed,
                });
            }
        }

        if request.values().all(Quantity::is_zero) {
            return insufficient;
        }

        let mut used = ResourceList::new();
        for occupant in occupants {
            add_into(&mut used, &occupant_requests(occupant));
        }

        for (name, requested) in request {
            if requested.is_zero() || name == resources::PODS {
                continue;
            }
            let used = used.get(name).copied().unwrap_or_default();
            let capacity = allocatable.get(name).copied().unwrap_or_default();
            if requested.saturating_add(used) > capacity {
                insufficient.push(InsufficientResource {
                    resource: name.clone(),
                    requested: *requested,
                    used,
                    capacity,
                });
            }
        }

        insufficient
    }
}

/// Effective resource request of a pod. A malformed quantity is an error.
pub fn pod_requests(pod: &Pod) -> Result<ResourceList, ResourceError> {
    effective_requests(pod, parse_resources)
}

/// Effective resource request of a pod already bound to a node. Malformed
/// quantities are left out of the accounting.
pub fn occupant_requests(pod: &Pod) -> ResourceList {
    let owner = pod.pod_ref().to_string();
    effective_requests(pod, |raw| {
        Ok::<_, Infallible>(parse_resources_lossy(raw, &owner))
    })
    .unwrap_or_else(|never| match never {})
}

fn effective_requests<E>(
    pod: &Pod,
    mut parse: impl FnMut(&ApiResourceList) -> Result<ResourceList, E>,
) -> Result<ResourceList, E> {
    let mut total = ResourceList::new();
    for container in pod.containers() {
        if let Some(raw) = container_requests(container) {
            add_into(&mut total, &parse(raw)?);
        }
    }
    // Init containers run one at a time before the app containers.
    for init in pod.init_containers() {
        let Some(raw) = container_requests(init) else {
            continue;
        };
        for (name, quantity) in parse(raw)? {
            let entry = total.entry(name).or_default();
            if quantity > *entry {
                *entry = quantity;
            }
        }
    }
    if let Some(overhead) = pod.overhead() {
        add_into(&mut total, &parse(overhead)?);
    }
    Ok(total)
}

fn add_into(total: &mut ResourceList, extra: &ResourceList) {
    for (name, quantity) in extra {
        let entry = total.entry(name.clone()).or_default();
        *entry = entry.saturating_add(*quantity);
    }
}
