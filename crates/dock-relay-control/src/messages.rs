//! Task and notification messages.
//!
//! Inbound work arrives as named [`Task`]s; everything the relay emits for
//! downstream consumers is a named [`Notification`]. Task payloads are decoded
//! and validated at the boundary by [`Task::decode`].

use dock_relay_core::HostAddr;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::event::EnrichedEvent;

/// Task queue names.
pub mod task_names {
    /// Start the cluster listener.
    pub const SWARM_CONNECT: &str = "swarm.events-stream.connect";
    /// Start a host listener.
    pub const STREAM_CONNECT: &str = "docker.events-stream.connect";
    /// Probe a host listener.
    pub const STREAM_PING: &str = "docker.events-stream.ping";
    /// Repair registry drift against the cluster topology.
    pub const STREAM_RECONCILE: &str = "docker.events-stream.reconcile";
    /// Inspect one container.
    pub const CONTAINER_POLL: &str = "container.state.poll";
    /// A container failed its health check.
    pub const HEALTH_CHECK_FAILED: &str = "instance.container.health-check.failed";
    /// Periodic tick.
    pub const TICK: &str = "time.five-minutes.passed";
    /// Enrich and dispatch one event frame.
    pub const EVENT_PUBLISH: &str = "docker.event.publish";
}

/// Notification destination names.
pub mod notification_names {
    /// A tenant container was created.
    pub const INSTANCE_CONTAINER_CREATE: &str = "on-instance-container-create";
    /// An image builder container was created.
    pub const IMAGE_BUILDER_CONTAINER_CREATE: &str = "on-image-builder-container-create";
    /// A tenant container died.
    pub const INSTANCE_CONTAINER_DIE: &str = "on-instance-container-die";
    /// An image builder container died.
    pub const IMAGE_BUILDER_CONTAINER_DIE: &str = "on-image-builder-container-die";
    /// Any container started.
    pub const CONTAINER_STARTED: &str = "container.life-cycle.started";
    /// Any container died.
    pub const CONTAINER_DIED: &str = "container.life-cycle.died";
    /// A host's engine joined the cluster.
    pub const STREAM_CONNECTED: &str = "docker.events-stream.connected";
    /// A host's engine left the cluster.
    pub const STREAM_DISCONNECTED: &str = "docker.events-stream.disconnected";
    /// A host disappeared from the cluster.
    pub const DOCK_LOST: &str = "dock.lost";
    /// Result of a container poll.
    pub const CONTAINER_POLLED: &str = "container.state.polled";
}

/// Payload addressing one host listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostJob {
    /// Docker host.
    pub host: HostAddr,
    /// Org owning the host.
    pub org: String,
}

/// Payload of `container.state.poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPollJob {
    /// Docker host running the container.
    pub host: HostAddr,
    /// Container ID.
    pub id: String,
    /// Org owning the container.
    #[serde(default)]
    pub org_id: Option<String>,
}

/// Payload of `instance.container.health-check.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckFailedJob {
    /// Docker host running the container.
    pub host: HostAddr,
    /// Container ID.
    pub id: String,
    /// Org owning the container.
    #[serde(default)]
    pub org_id: Option<String>,
}

/// Payload of `docker.event.publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPublishJob {
    /// Host whose stream produced the frame.
    #[serde(rename = "Host")]
    pub host: HostAddr,
    /// Org owning that host; absent for the cluster stream.
    #[serde(default)]
    pub org: Option<String>,
    /// The raw event frame.
    pub event: String,
}

/// An inbound unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// `swarm.events-stream.connect`
    SwarmConnect,
    /// `docker.events-stream.connect`
    StreamConnect(HostJob),
    /// `docker.events-stream.ping`
    StreamPing(HostJob),
    /// `docker.events-stream.reconcile`
    StreamReconcile,
    /// `container.state.poll`
    ContainerPoll(ContainerPollJob),
    /// `instance.container.health-check.failed`
    HealthCheckFailed(HealthCheckFailedJob),
    /// `time.five-minutes.passed`
    Tick,
    /// `docker.event.publish`
    EventPublish(EventPublishJob),
}

impl Task {
    /// Queue name of this task.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        use task_names::{
            CONTAINER_POLL, EVENT_PUBLISH, HEALTH_CHECK_FAILED, STREAM_CONNECT, STREAM_PING,
            STREAM_RECONCILE, SWARM_CONNECT, TICK,
        };

        match self {
            Self::SwarmConnect => SWARM_CONNECT,
            Self::StreamConnect(_) => STREAM_CONNECT,
            Self::StreamPing(_) => STREAM_PING,
            Self::StreamReconcile => STREAM_RECONCILE,
            Self::ContainerPoll(_) => CONTAINER_POLL,
            Self::HealthCheckFailed(_) => HEALTH_CHECK_FAILED,
            Self::Tick => TICK,
            Self::EventPublish(_) => EVENT_PUBLISH,
        }
    }

    /// Decode and validate a named task payload.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidTask` for an unknown name or a payload that
    /// does not match the task's schema.
    pub fn decode(name: &str, payload: serde_json::Value) -> Result<Self> {
        let task = match name {
            task_names::SWARM_CONNECT => Self::SwarmConnect,
            task_names::STREAM_CONNECT => Self::StreamConnect(payload_of(name, payload)?),
            task_names::STREAM_PING => Self::StreamPing(payload_of(name, payload)?),
            task_names::STREAM_RECONCILE => Self::StreamReconcile,
            task_names::CONTAINER_POLL => Self::ContainerPoll(payload_of(name, payload)?),
            task_names::HEALTH_CHECK_FAILED => {
                Self::HealthCheckFailed(payload_of(name, payload)?)
            }
            task_names::TICK => Self::Tick,
            task_names::EVENT_PUBLISH => Self::EventPublish(payload_of(name, payload)?),
            _ => {
                return Err(RelayError::InvalidTask {
                    name: name.to_string(),
                    reason: "unknown task".to_string(),
                })
            }
        };

        task.validate()?;
        Ok(task)
    }

    /// Check the fields the schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidTask` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let missing = match self {
            Self::StreamConnect(job) | Self::StreamPing(job) if job.org.trim().is_empty() => {
                Some("org")
            }
            Self::ContainerPoll(ContainerPollJob { id, .. })
            | Self::HealthCheckFailed(HealthCheckFailedJob { id, .. })
                if id.trim().is_empty() =>
            {
                Some("id")
            }
            Self::EventPublish(job) if job.event.trim().is_empty() => Some("event"),
            _ => None,
        };

        match missing {
            Some(field) => Err(RelayError::InvalidTask {
                name: self.name().to_string(),
                reason: format!("{field} must not be empty"),
            }),
            None => Ok(()),
        }
    }
}

fn payload_of<T: DeserializeOwned>(name: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| RelayError::InvalidTask {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Payload of `dock.lost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockLost {
    /// Host URL, `http://ip:port`.
    pub host: String,
    /// Org owning the host.
    pub org_id: Option<String>,
}

/// Payload of `container.state.polled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPolled {
    /// Host URL, `http://ip:port`.
    pub host: String,
    /// Container ID.
    pub id: String,
    /// Org owning the container.
    pub org_id: Option<String>,
    /// Container inspection document.
    pub inspect_data: serde_json::Value,
}

/// An outbound message for downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `on-instance-container-create`
    InstanceContainerCreate(EnrichedEvent),
    /// `on-image-builder-container-create`
    ImageBuilderContainerCreate(EnrichedEvent),
    /// `on-instance-container-die`
    InstanceContainerDie(EnrichedEvent),
    /// `on-image-builder-container-die`
    ImageBuilderContainerDie(EnrichedEvent),
    /// `container.life-cycle.started`
    ContainerStarted(EnrichedEvent),
    /// `container.life-cycle.died`
    ContainerDied(EnrichedEvent),
    /// `docker.events-stream.connected`
    StreamConnected(EnrichedEvent),
    /// `docker.events-stream.disconnected`
    StreamDisconnected(EnrichedEvent),
    /// `dock.lost`
    DockLost(DockLost),
    /// `container.state.polled`
    ContainerPolled(ContainerPolled),
}

impl Notification {
    /// Destination name of this notification.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        use notification_names as n;

        match self {
            Self::InstanceContainerCreate(_) => n::INSTANCE_CONTAINER_CREATE,
            Self::ImageBuilderContainerCreate(_) => n::IMAGE_BUILDER_CONTAINER_CREATE,
            Self::InstanceContainerDie(_) => n::INSTANCE_CONTAINER_DIE,
            Self::ImageBuilderContainerDie(_) => n::IMAGE_BUILDER_CONTAINER_DIE,
            Self::ContainerStarted(_) => n::CONTAINER_STARTED,
            Self::ContainerDied(_) => n::CONTAINER_DIED,
            Self::StreamConnected(_) => n::STREAM_CONNECTED,
            Self::StreamDisconnected(_) => n::STREAM_DISCONNECTED,
            Self::DockLost(_) => n::DOCK_LOST,
            Self::ContainerPolled(_) => n::CONTAINER_POLLED,
        }
    }

    /// The enriched event carried by this notification, if any.
    #[must_use]
    pub const fn event(&self) -> Option<&EnrichedEvent> {
        match self {
            Self::InstanceContainerCreate(e)
            | Self::ImageBuilderContainerCreate(e)
            | Self::InstanceContainerDie(e)
            | Self::ImageBuilderContainerDie(e)
            | Self::ContainerStarted(e)
            | Self::ContainerDied(e)
            | Self::StreamConnected(e)
            | Self::StreamDisconnected(e) => Some(e),
            Self::DockLost(_) | Self::ContainerPolled(_) => None,
        }
    }

    /// JSON body of this notification.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Internal` if the payload cannot be serialized.
    pub fn payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::DockLost(p) => serde_json::to_value(p),
            Self::ContainerPolled(p) => serde_json::to_value(p),
            _ => serde_json::to_value(self.event()),
        };
        value.map_err(|e| RelayError::Internal(format!("serialize {}: {e}", self.name())))
    }
}
