//! Relay service assembly.
//!
//! Builds the shared state (watermarks, stats, listener registry, dispatcher,
//! task handlers) from a [`RelayConfig`] and hands out the pieces the binary
//! and the HTTP surface need.

use std::sync::Arc;

use dock_relay_docker::DockerConnector;

use crate::config::RelayConfig;
use crate::dispatcher::{DispatcherConfig, EventDispatcher};
use crate::publisher::{Publisher, TaskReceiver, TaskSender};
use crate::registry::ListenerRegistry;
use crate::since_map::SinceMap;
use crate::stats::RelayStats;
use crate::tasks::TaskHandlers;
use crate::worker::{Worker, WorkerConfig};

/// The assembled relay.
pub struct RelayService {
    since: Arc<SinceMap>,
    stats: Arc<RelayStats>,
    registry: Arc<ListenerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    handlers: Arc<TaskHandlers>,
    publisher: Arc<dyn Publisher>,
    worker_config: WorkerConfig,
}

impl RelayService {
    /// Assemble the relay over a docker connector and a publisher.
    #[must_use]
    pub fn new(
        config: &RelayConfig,
        connector: Arc<dyn DockerConnector>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let since = Arc::new(SinceMap::new());
        let stats = Arc::new(RelayStats::new());

        let registry = Arc::new(ListenerRegistry::new(
            Arc::clone(&connector),
            Arc::clone(&since),
            Arc::clone(&publisher),
            config.liveness_timeout,
        ));

        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&connector),
            Arc::clone(&since),
            Arc::clone(&publisher),
            Arc::clone(&stats),
            DispatcherConfig {
                blacklist: config.blacklist.clone(),
                inspect_retries: config.inspect_retries,
            },
        ));

        let handlers = Arc::new(TaskHandlers::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            connector,
            Arc::clone(&publisher),
        ));

        Self {
            since,
            stats,
            registry,
            dispatcher,
            handlers,
            publisher,
            worker_config: WorkerConfig {
                concurrency: config.worker_concurrency,
                max_attempts: config.max_task_attempts,
                retry_base: config.task_retry_base,
            },
        }
    }

    /// Build the worker draining `receiver`. `tasks` is used for redelivery.
    #[must_use]
    pub fn worker(&self, tasks: TaskSender, receiver: TaskReceiver) -> Worker {
        Worker::new(Arc::clone(&self.handlers), tasks, receiver, self.worker_config)
    }

    /// Per-host event watermarks.
    #[must_use]
    pub fn since(&self) -> &Arc<SinceMap> {
        &self.since
    }

    /// Event counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Live listeners.
    #[must_use]
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Event pipeline.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Task handlers.
    #[must_use]
    pub fn handlers(&self) -> &Arc<TaskHandlers> {
        &self.handlers
    }

    /// Outbound publisher.
    #[must_use]
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Redelivery policy the worker runs with.
    #[must_use]
    pub const fn worker_config(&self) -> WorkerConfig {
        self.worker_config
    }
}
