//! Shared utilities for the gleaner workspace.
//!
//! Provides retry with exponential backoff and jitter, environment variable
//! parsing helpers, and tracing initialization.

pub mod env;
pub mod logging;
pub mod retry;

use thiserror::Error;

/// Result type alias for tooling operations.
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Errors from the tooling utilities.
#[derive(Debug, Error)]
pub enum ToolingError {
    /// Environment variable exists but could not be used.
    #[error("Environment error: {0}")]
    Env(String),

    /// Generic error with message.
    #[error("{0}")]
    General(String),
}
