//! Domain error types
//!
//! Errors raised while constructing or parsing domain values, before any
//! network interaction takes place.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A byte range string from an upload session could not be parsed
    #[error("Invalid byte range: {0:?}")]
    InvalidByteRange(String),

    /// An item name cannot be used as a path segment
    #[error("Invalid item name: {0}")]
    InvalidName(String),
}
