//! Common error types for dock-relay.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the dock-relay system.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A host address could not be parsed.
    #[error("invalid host address: {0}")]
    InvalidHost(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
