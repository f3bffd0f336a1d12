//! Error types for knowledge-graph operations.

use thiserror::Error;

/// Result type for KG operations.
pub type Result<T> = std::result::Result<T, KgError>;

/// Errors that can occur when working with graph domain types.
#[derive(Debug, Error)]
pub enum KgError {
    /// Unknown node kind name or ID prefix.
    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    /// Unknown edge type name.
    #[error("Unknown edge type: {0}")]
    UnknownEdgeType(String),

    /// Malformed node or edge identifier.
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Rollback target is not strictly before the current version.
    #[error("Cannot rollback to version {target} (current version is {current})")]
    RollbackTarget { target: i64, current: i64 },

    /// Store rejected an operation.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
