//! Placement error types.

use thiserror::Error;

use betternode_model::ResourceError;

/// A node selector, affinity term, label requirement or resource request
/// that cannot be evaluated. Raised while compiling a pod's placement
/// constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("invalid label key {key:?}: {reason}")]
    InvalidLabelKey { key: String, reason: String },

    #[error("invalid label value {value:?} for key {key:?}")]
    InvalidLabelValue { key: String, value: String },

    #[error("unknown operator {operator:?} for key {key:?}")]
    UnknownOperator { key: String, operator: String },

    #[error("operator {operator} on {key:?} requires at least one value")]
    MissingValues { key: String, operator: String },

    #[error("operator {operator} on {key:?} takes no values")]
    UnexpectedValues { key: String, operator: String },

    #[error("operator {operator} on {key:?} requires exactly one value, got {count}")]
    ExpectedSingleValue {
        key: String,
        operator: String,
        count: usize,
    },

    #[error("value {value:?} for key {key:?} is not an integer")]
    InvalidInteger { key: String, value: String },

    #[error("unsupported field selector key {0:?}")]
    UnsupportedField(String),

    #[error(transparent)]
    InvalidResource(#[from] ResourceError),
}

/// Result type alias for constraint evaluation.
pub type ConstraintResult<T> = Result<T, ConstraintError>;
