//! Types for the docker adapters.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use dock_relay_core::HostAddr;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// A stream of raw byte chunks from a docker `/events` endpoint.
///
/// Chunks are not aligned to event boundaries; see [`crate::FrameBuffer`].
pub type EventStream = Pin<Box<dyn Stream<Item = crate::Result<Vec<u8>>> + Send>>;

/// Summary of a running container, as returned by `GET /containers/json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container ID.
    #[serde(rename = "Id")]
    pub id: String,
    /// Image the container was created from.
    #[serde(rename = "Image", default)]
    pub image: String,
    /// Container state (`running`, `exited`, ...).
    #[serde(rename = "State", default)]
    pub state: String,
    /// Container labels.
    #[serde(rename = "Labels", default)]
    pub labels: HashMap<String, String>,
}

/// A node of the cluster, as reported by the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Node name, `<hostname>.<org>`.
    pub name: String,
    /// Docker daemon address of the node.
    pub host: HostAddr,
    /// Org owning the node, if it could be determined.
    pub org: Option<String>,
    /// Health status reported by the manager (`Healthy`, `Pending`, ...).
    pub status: String,
    /// Engine labels of the node.
    pub labels: HashMap<String, String>,
}

impl ClusterNode {
    /// Check if the manager reports this node as healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Parameters for opening an event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventsQuery {
    /// Resume point (unix seconds). Zero means "from now".
    pub since: u64,
    /// Event types to watch.
    pub events: Vec<String>,
}

impl EventsQuery {
    /// Create a query for the given event types.
    #[must_use]
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            since: 0,
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the resume point.
    #[must_use]
    pub const fn since(mut self, since: u64) -> Self {
        self.since = since;
        self
    }
}

/// Configuration for the HTTP docker adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockerConfig {
    /// Timeout for one-shot requests (inspect, list, top, info).
    pub request_timeout: Duration,
    /// Timeout for establishing a TCP connection; the only limit applied to event streams.
    pub connect_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
