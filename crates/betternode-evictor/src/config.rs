//! Eviction pass settings.

use serde::{Deserialize, Serialize};

use betternode_placement::SelectionPolicy;

/// What to do when a single pod cannot be evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the pass on the first invalid constraint.
    #[default]
    FailFast,
    /// Log the pod, record it as skipped and carry on.
    SkipWorkload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EvictorConfig {
    /// Report decisions without deleting anything.
    pub dry_run: bool,
    /// Margin a candidate's score must clear over the current node's.
    pub tolerance: i64,
    pub on_error: ErrorPolicy,
    pub selection: SelectionPolicy,
}
