//! Error types for the control plane.
//!
//! Every failure is classified at the point of detection as either retryable
//! (the worker redelivers the task later) or fatal (the unit of work is dropped).

use dock_relay_core::HostAddr;
use dock_relay_docker::DockerError;
use thiserror::Error;

use crate::lifecycle::ListenerState;

/// A result type using `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while relaying docker events.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The event frame could not be decoded.
    #[error("malformed event frame: {0}")]
    MalformedEvent(String),

    /// The container no longer exists on its host.
    #[error("container {id} no longer exists on {host}")]
    ContainerGone {
        /// Host the container was looked up on.
        host: HostAddr,
        /// Container ID.
        id: String,
    },

    /// The host is no longer part of the cluster.
    #[error("host {0} is no longer part of the cluster")]
    HostGone(HostAddr),

    /// A task payload failed validation.
    #[error("invalid task {name}: {reason}")]
    InvalidTask {
        /// Task name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The requested listener state transition is not valid.
    #[error("invalid listener transition for {host}: cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Listener host.
        host: HostAddr,
        /// The current state.
        from: ListenerState,
        /// The requested target state.
        to: ListenerState,
    },

    /// Docker call failed while the target is still believed to exist.
    #[error("docker error: {0}")]
    Docker(#[from] DockerError),

    /// The event stream of a host could not be opened.
    #[error("failed to open event stream on {host}: {source}")]
    ListenerStart {
        /// Host whose stream failed to open.
        host: HostAddr,
        /// Underlying docker error.
        #[source]
        source: DockerError,
    },

    /// A task or notification could not be published.
    #[error("publish failed: {0}")]
    Publish(String),

    /// A liveness probe failed.
    #[error("probe failed on {host}: {message}")]
    ProbeFailed {
        /// Probed host.
        host: HostAddr,
        /// Failure description.
        message: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::MalformedEvent(_) | Self::InvalidTask { .. } => 400,
            Self::ContainerGone { .. } | Self::HostGone(_) => 404,
            Self::InvalidTransition { .. } => 409,
            Self::Docker(_) | Self::ListenerStart { .. } | Self::ProbeFailed { .. } => 502,
            Self::Publish(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Docker(_)
                | Self::ListenerStart { .. }
                | Self::Publish(_)
                | Self::ProbeFailed { .. }
                | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostAddr {
        HostAddr::parse("10.0.0.1:4242").unwrap()
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        assert!(!RelayError::MalformedEvent("eof".into()).is_retriable());
        assert!(!RelayError::ContainerGone {
            host: host(),
            id: "abc".into()
        }
        .is_retriable());
        assert!(!RelayError::HostGone(host()).is_retriable());
        assert!(!RelayError::InvalidTask {
            name: "x".into(),
            reason: "y".into()
        }
        .is_retriable());
    }

    #[test]
    fn transient_errors_are_retried() {
        let api = DockerError::Api {
            status: 500,
            message: "busy".into(),
        };
        assert!(RelayError::Docker(api).is_retriable());
        assert!(RelayError::ListenerStart {
            host: host(),
            source: DockerError::Stream("reset".into())
        }
        .is_retriable());
        assert!(RelayError::Publish("queue closed".into()).is_retriable());
        assert!(RelayError::ProbeFailed {
            host: host(),
            message: "timeout".into()
        }
        .is_retriable());
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            RelayError::InvalidTask {
                name: "x".into(),
                reason: "y".into()
            }
            .http_status_code(),
            400
        );
        assert_eq!(RelayError::HostGone(host()).http_status_code(), 404);
        assert_eq!(RelayError::Publish("closed".into()).http_status_code(), 503);
    }
}
