//! Inbound task handlers.

use std::sync::Arc;

use dock_relay_docker::DockerConnector;
use tracing::{debug, info, warn};

use crate::dispatcher::EventDispatcher;
use crate::error::{RelayError, Result};
use crate::lifecycle::CloseReason;
use crate::messages::{
    ContainerPollJob, ContainerPolled, HealthCheckFailedJob, HostJob, Notification, Task,
};
use crate::publisher::Publisher;
use crate::registry::ListenerRegistry;

/// Executes inbound tasks against the registry, dispatcher and docker.
pub struct TaskHandlers {
    registry: Arc<ListenerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    connector: Arc<dyn DockerConnector>,
    publisher: Arc<dyn Publisher>,
}

impl TaskHandlers {
    /// Create the handlers.
    #[must_use]
    pub fn new(
        registry: Arc<ListenerRegistry>,
        dispatcher: Arc<EventDispatcher>,
        connector: Arc<dyn DockerConnector>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            connector,
            publisher,
        }
    }

    /// Execute one task.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, classified by [`RelayError::is_retriable`].
    pub async fn handle(&self, task: &Task) -> Result<()> {
        match task {
            Task::SwarmConnect => self.registry.start_cluster_listener().await.map(drop),
            Task::StreamConnect(job) => self.connect(job).await,
            Task::StreamPing(job) => self.ping(job).await,
            Task::StreamReconcile => self.reconcile().await,
            Task::ContainerPoll(job) => self.poll(job).await,
            Task::HealthCheckFailed(job) => self.health_check_failed(job).await,
            Task::Tick => self.tick().await,
            Task::EventPublish(job) => self.dispatcher.dispatch(job).await.map(drop),
        }
    }

    async fn connect(&self, job: &HostJob) -> Result<()> {
        let exists = self.connector.cluster().host_exists(&job.host).await?;
        if !exists {
            warn!(host = %job.host, org = %job.org, "Host is not in the cluster, dropping listener");
            self.registry.remove_listener(&job.host);
            return Err(RelayError::HostGone(job.host.clone()));
        }

        self.registry
            .start_host_listener(job.host.clone(), Some(job.org.clone()))
            .await
            .map(drop)
    }

    async fn ping(&self, job: &HostJob) -> Result<()> {
        let Some(listener) = self.registry.get(&job.host) else {
            debug!(host = %job.host, "No listener to ping");
            return Ok(());
        };
        if !listener.is_connected() {
            debug!(host = %job.host, state = ?listener.state(), "Listener not connected, skipping ping");
            return Ok(());
        }

        if let Err(e) = listener.probe().await {
            warn!(host = %job.host, error = %e, "Ping failed, closing listener");
            listener.close(CloseReason::ProbeFailed(e.to_string()));
        }
        Ok(())
    }

    async fn reconcile(&self) -> Result<()> {
        let nodes = self.connector.cluster().list_nodes().await?;
        self.registry.reconcile(&nodes).await.map(drop)
    }

    async fn poll(&self, job: &ContainerPollJob) -> Result<()> {
        let org = job.org_id.as_deref();
        let inspect_data = self.dispatcher.inspect(&job.host, org, &job.id).await?;

        self.publisher
            .publish_notification(Notification::ContainerPolled(ContainerPolled {
                host: job.host.to_url(),
                id: job.id.clone(),
                org_id: job.org_id.clone(),
                inspect_data,
            }))
            .await
    }

    async fn health_check_failed(&self, job: &HealthCheckFailedJob) -> Result<()> {
        info!(host = %job.host, id = %job.id, "Health check failed, polling container");
        self.publisher
            .publish_task(Task::ContainerPoll(ContainerPollJob {
                host: job.host.clone(),
                id: job.id.clone(),
                org_id: job.org_id.clone(),
            }))
            .await
    }

    async fn tick(&self) -> Result<()> {
        if self.registry.cluster_listener().is_none() {
            info!("Cluster listener is down, requesting connect");
            self.publisher.publish_task(Task::SwarmConnect).await?;
        }

        let listeners = self.registry.get_all();
        debug!(listeners = listeners.len(), "Tick");

        for listener in listeners {
            let Some(org) = listener.org() else {
                continue;
            };
            self.publisher
                .publish_task(Task::StreamPing(HostJob {
                    host: listener.host().clone(),
                    org: org.to_string(),
                }))
                .await?;
        }

        self.publisher.publish_task(Task::StreamReconcile).await
    }
}
