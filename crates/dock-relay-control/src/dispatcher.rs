//! Event enrichment and dispatch.
//!
//! One `docker.event.publish` frame at a time:
//!
//! ```text
//! parse ─▶ normalize ─▶ blacklist ─▶ watermark ─▶ inspect ─▶ route ─▶ count
//!   │                      │                        │
//!   ▼                      ▼                        ▼
//! MalformedEvent        dropped            ContainerGone / HostGone (+ dock.lost)
//!                                          or retryable Docker error
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use dock_relay_core::HostAddr;
use dock_relay_docker::{DockerConnector, DockerError};
use tracing::{debug, info, trace, warn};

use crate::error::{RelayError, Result};
use crate::event::{format_event, EnrichedEvent, RawEvent};
use crate::messages::{DockLost, EventPublishJob, HostJob, Notification, Task};
use crate::publisher::Publisher;
use crate::since_map::SinceMap;
use crate::stats::RelayStats;

/// `type` label of tenant containers.
pub const USER_CONTAINER: &str = "user-container";

/// `type` label of image build containers.
pub const IMAGE_BUILDER_CONTAINER: &str = "image-builder-container";

const INSPECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// What happened to a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Dropped by the blacklist.
    Blacklisted,
    /// Routed; carries the number of notifications published.
    Published(usize),
    /// Not an event type the relay routes.
    Ignored,
}

/// Settings for the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Image name substrings whose events are dropped.
    pub blacklist: Vec<String>,
    /// Attempts per inspection before the failure is classified.
    pub inspect_retries: u32,
}

/// Enriches raw event frames and routes them to their destinations.
pub struct EventDispatcher {
    connector: Arc<dyn DockerConnector>,
    since: Arc<SinceMap>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<RelayStats>,
    config: DispatcherConfig,
}

impl EventDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        connector: Arc<dyn DockerConnector>,
        since: Arc<SinceMap>,
        publisher: Arc<dyn Publisher>,
        stats: Arc<RelayStats>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            connector,
            since,
            publisher,
            stats,
            config,
        }
    }

    /// Run the full pipeline over one frame.
    ///
    /// # Errors
    ///
    /// Fatal: `MalformedEvent`, `ContainerGone`, `HostGone`.
    /// Retryable: `Docker` when the host still exists, `Publish`.
    pub async fn dispatch(&self, job: &EventPublishJob) -> Result<DispatchOutcome> {
        let raw = RawEvent::parse(&job.event)?;
        let mut event = format_event(raw, &job.host, job.org.as_deref())?;

        if self.is_blacklisted(&event, &job.host) {
            debug!(status = %event.status, from = ?event.from, host = %job.host, "Dropping blacklisted event");
            return Ok(DispatchOutcome::Blacklisted);
        }

        self.since.set(&job.host, event.time);

        let status = event.status.clone();
        if matches!(status.as_str(), "create" | "start" | "die") {
            let Some(id) = event.id.clone() else {
                return Err(RelayError::MalformedEvent(format!("{status} event without id")));
            };
            let host = event.host_addr()?;
            let data = self.inspect(&host, event.org.as_deref(), &id).await?;
            event.inspect_data = Some(data);
        }

        let notifications = Self::route(&event);
        if notifications.is_empty() {
            if !matches!(status.as_str(), "create" | "die") {
                trace!(status = %status, host = %event.host, "Ignoring event");
                return Ok(DispatchOutcome::Ignored);
            }
            debug!(status = %status, id = ?event.id, "No destination for container type");
        }

        if status == "engine_connect" {
            self.request_connect(&event).await?;
        }

        let published = notifications.len();
        for notification in notifications {
            self.publisher.publish_notification(notification).await?;
        }

        self.stats
            .record_event(&status, &event.host, event.org.as_deref(), event.time);
        debug!(status = %status, host = %event.host, uuid = %event.uuid, published, "Dispatched event");

        Ok(DispatchOutcome::Published(published))
    }

    /// Whether an event should be dropped before any further processing.
    #[must_use]
    pub fn is_blacklisted(&self, event: &EnrichedEvent, source: &HostAddr) -> bool {
        if matches!(event.status.as_str(), "engine_connect" | "engine_disconnect") {
            return false;
        }
        if source == self.connector.cluster_host() {
            return true;
        }
        event.from.as_deref().is_some_and(|image| {
            self.config
                .blacklist
                .iter()
                .any(|needle| !needle.is_empty() && image.contains(needle.as_str()))
        })
    }

    /// Inspect a container, classifying failures.
    ///
    /// # Errors
    ///
    /// See [`EventDispatcher::inspection_failure`].
    pub async fn inspect(
        &self,
        host: &HostAddr,
        org: Option<&str>,
        id: &str,
    ) -> Result<serde_json::Value> {
        let engine = self.connector.engine(host);
        let attempts = self.config.inspect_retries.max(1);
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let result = engine.inspect_container(id).await;
            let elapsed = started.elapsed();
            self.stats.record_inspection(elapsed);
            trace!(host = %host, id, elapsed_ms = elapsed.as_millis(), "Inspected container");

            match result {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retriable() && attempt < attempts => {
                    debug!(host = %host, id, attempt, error = %e, "Inspect failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(INSPECT_RETRY_DELAY).await;
                }
                Err(e) => return Err(self.inspection_failure(host, org, id, e).await),
            }
        }
    }

    /// Classify a failed inspection.
    ///
    /// 404 means the container is gone. Anything else checks whether the host
    /// is still in the cluster: if not, `dock.lost` is published and the error
    /// is `HostGone`; if it is (or the check itself fails), the docker error is
    /// returned as retryable.
    pub async fn inspection_failure(
        &self,
        host: &HostAddr,
        org: Option<&str>,
        id: &str,
        error: DockerError,
    ) -> RelayError {
        if error.is_not_found() {
            info!(host = %host, id, "Container no longer exists");
            return RelayError::ContainerGone {
                host: host.clone(),
                id: id.to_string(),
            };
        }

        match self.connector.cluster().host_exists(host).await {
            Ok(false) => {
                warn!(host = %host, org = ?org, error = %error, "Host left the cluster");
                let lost = Notification::DockLost(DockLost {
                    host: host.to_url(),
                    org_id: org.map(str::to_string),
                });
                if let Err(e) = self.publisher.publish_notification(lost).await {
                    warn!(host = %host, error = %e, "Failed to publish dock.lost");
                }
                RelayError::HostGone(host.clone())
            }
            Ok(true) => {
                warn!(host = %host, id, error = %error, "Inspect failed on live host");
                RelayError::Docker(error)
            }
            Err(e) => {
                warn!(host = %host, error = %e, "Could not check host membership");
                RelayError::Docker(error)
            }
        }
    }

    fn route(event: &EnrichedEvent) -> Vec<Notification> {
        let container_type = event.container_type();
        let mut out = Vec::new();

        match event.status.as_str() {
            "create" => match container_type {
                Some(USER_CONTAINER) => out.push(Notification::InstanceContainerCreate(event.clone())),
                Some(IMAGE_BUILDER_CONTAINER) => {
                    out.push(Notification::ImageBuilderContainerCreate(event.clone()));
                }
                _ => {}
            },
            "start" => out.push(Notification::ContainerStarted(event.clone())),
            "die" => {
                match container_type {
                    Some(USER_CONTAINER) => out.push(Notification::InstanceContainerDie(event.clone())),
                    Some(IMAGE_BUILDER_CONTAINER) => {
                        out.push(Notification::ImageBuilderContainerDie(event.clone()));
                    }
                    _ => {}
                }
                out.push(Notification::ContainerDied(event.clone()));
            }
            "engine_connect" => out.push(Notification::StreamConnected(event.clone())),
            "engine_disconnect" => out.push(Notification::StreamDisconnected(event.clone())),
            _ => {}
        }

        out
    }

    async fn request_connect(&self, event: &EnrichedEvent) -> Result<()> {
        let Some(org) = event.org.clone() else {
            warn!(host = %event.host, "engine_connect without org, not connecting");
            return Ok(());
        };
        let host = event.host_addr()?;
        self.publisher
            .publish_task(Task::StreamConnect(HostJob { host, org }))
            .await
    }
}
