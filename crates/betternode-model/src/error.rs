//! Error types for the object model.

use thiserror::Error;

/// Errors that can occur while parsing a resource quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity number: {0:?}")]
    InvalidNumber(String),

    #[error("unknown quantity suffix: {0:?}")]
    UnknownSuffix(String),

    #[error("quantity out of range: {0:?}")]
    Overflow(String),
}

/// A named entry of a resource list that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid quantity for resource {resource:?}: {source}")]
pub struct ResourceError {
    pub resource: String,
    #[source]
    pub source: QuantityError,
}
