//! betternode-evictor: the eviction driver.
//!
//! Walks every rebalance candidate in a cluster snapshot, asks the
//! better-node finder whether its current node is dominated, and deletes
//! the pods that are so the cluster scheduler can place them again.
//! Deletion is skipped in dry-run mode; decisions are reported either way.

pub mod config;
pub mod driver;
pub mod error;

pub use config::{ErrorPolicy, EvictorConfig};
pub use driver::{Decision, Evictor, RunReport, Skipped};
pub use error::{EvictError, EvictResult};
