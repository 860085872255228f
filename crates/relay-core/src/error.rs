//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors produced when validating a requested handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// Nothing left after trimming
    #[error("handle is empty")]
    Empty,

    /// Handle contains a space, tab or other whitespace character
    #[error("handle contains whitespace: {0:?}")]
    ContainsWhitespace(String),
}
