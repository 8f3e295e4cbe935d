//! betternode-model: cluster object model for kube-better-node.
//!
//! Nodes and pods are the `k8s-openapi` `core/v1` types, re-exported here
//! together with [`NodeExt`] / [`PodExt`] accessors that flatten the
//! optional fields placement evaluation reads.
//!
//! Resource values are [`Quantity`]s: the Kubernetes quantity grammar
//! (`500m`, `1.5Gi`, `2e3`) held as signed milli-units, parsed from the
//! string form the API carries.

pub mod error;
pub mod quantity;
pub mod types;

pub use error::{QuantityError, ResourceError};
pub use quantity::Quantity;
pub use types::*;
