//! kube-better-node placement core: filters, scoring, better-node search.
//!
//! This crate decides whether a running pod's current node is dominated by
//! another eligible node. It does NOT talk to the cluster or evict anything
//! (that's `betternode-evictor`). Every function here is a pure computation
//! over a snapshot of nodes and pods.
//!
//! # Components
//!
//! - **`selector`**: Label/field requirement compilation and matching
//! - **`filter`**: Candidate filter (node selector, required affinity, resource fit)
//! - **`fit`**: Resource-fit accounting against node allocatable
//! - **`scorer`**: Preferred-term scoring
//! - **`finder`**: Better-node search over a candidate set

pub mod error;
pub mod filter;
pub mod finder;
pub mod fit;
pub mod scorer;
pub mod selector;

pub use error::{ConstraintError, ConstraintResult};
pub use filter::{CandidateFilter, Eligibility, PlacementConstraints, eligible};
pub use finder::{BetterNode, BetterNodeFinder, Occupancy, SelectionPolicy};
pub use fit::{InsufficientResource, NodeResourcesFit, ResourceFit, occupant_requests, pod_requests};
pub use scorer::{PreferredTerms, score};
pub use selector::{NodeSelectorMatcher, PlainSelector, TermMatcher};
