//! Error types for the docker adapters.

use thiserror::Error;

/// Errors that can occur while talking to a docker engine or the cluster manager.
#[derive(Error, Debug)]
pub enum DockerError {
    /// Transport-level HTTP error (connect refused, timeout, reset).
    #[error("docker HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The requested resource no longer exists (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The daemon answered with a non-success status.
    #[error("docker API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the daemon.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode docker response: {0}")]
    Decode(String),

    /// The event stream failed mid-flight.
    #[error("event stream error: {0}")]
    Stream(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DockerError {
    /// Check if this error means the resource is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Stream(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

/// A specialized Result type for docker operations.
pub type Result<T> = std::result::Result<T, DockerError>;
