//! Event listener state machine.
//!
//! This module defines the listener states, kinds and close reasons, and the
//! valid transitions between states.
//!
//! # State Machine
//!
//! ```text
//!     ┌────────┐  start   ┌────────────┐  stream open  ┌───────────┐
//!     │  Idle  │─────────▶│ Connecting │──────────────▶│ Connected │
//!     └───┬────┘          └─────┬──────┘               └─────┬─────┘
//!         │                     │ (stop while                │ timeout / error /
//!         │                     │  connecting)               │ end / stop / probe
//!         │                     ▼                            ▼
//!         │               ┌────────────────────────────────────────┐
//!         │               │                Closing                  │
//!         │               └───────────────────┬────────────────────┘
//!         │                                   │
//!         │          (open failed)            ▼
//!         └──────────────────────────▶┌──────────────┐
//!                                     │    Closed    │
//!                                     └──────────────┘
//! ```

use std::fmt;

use dock_relay_core::HostAddr;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// State of an event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    /// Created, not started.
    Idle,
    /// Opening the event stream.
    Connecting,
    /// Streaming events.
    Connected,
    /// Releasing the stream.
    Closing,
    /// Terminal.
    Closed,
}

/// What a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    /// The cluster manager's aggregated feed.
    Cluster,
    /// A single docker host.
    Host,
}

/// Synthetic liveness signal every listener watches.
pub const LIVENESS_EVENT: &str = "top";

impl ListenerKind {
    /// Event types this kind of listener subscribes to.
    #[must_use]
    pub fn watched_events(self) -> &'static [&'static str] {
        match self {
            Self::Cluster => &["engine_connect", "engine_disconnect", LIVENESS_EVENT],
            Self::Host => &["create", "start", "die", LIVENESS_EVENT],
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Why a listener closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// No data arrived before the liveness timeout.
    TimedOut,
    /// The daemon ended the stream.
    StreamEnded,
    /// The stream failed.
    StreamError(String),
    /// An explicit liveness probe failed.
    ProbeFailed(String),
    /// Stopped on request.
    Stopped,
}

impl CloseReason {
    /// Whether the host should be reconnected after this close.
    #[must_use]
    pub const fn should_reconnect(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "liveness timeout"),
            Self::StreamEnded => write!(f, "stream ended"),
            Self::StreamError(e) => write!(f, "stream error: {e}"),
            Self::ProbeFailed(e) => write!(f, "probe failed: {e}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `RelayError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(
    host: &HostAddr,
    from: ListenerState,
    to: ListenerState,
) -> Result<ListenerState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(RelayError::InvalidTransition {
            host: host.clone(),
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: ListenerState, to: ListenerState) -> bool {
    use ListenerState::{Closed, Closing, Connected, Connecting, Idle};

    matches!(
        (from, to),
        (Idle, Connecting)
            | (Connecting, Connected)
            // Open failed, or stopped before it was ever started
            | (Idle | Connecting, Closed)
            | (Connecting | Connected, Closing)
            | (Closing, Closed)
    )
}

/// Returns true if the listener is in a terminal state.
#[must_use]
pub const fn is_terminal(state: ListenerState) -> bool {
    matches!(state, ListenerState::Closed)
}
