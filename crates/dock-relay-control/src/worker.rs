//! Task worker.
//!
//! Pulls deliveries off the task queue and runs each one concurrently, bounded
//! by a semaphore. Retryable failures are redelivered with exponential backoff;
//! fatal failures are dropped. `swarm.events-stream.connect` has no attempt
//! ceiling: the cluster listener keeps retrying at the capped delay until the
//! manager is back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::messages::Task;
use crate::publisher::{Delivery, TaskReceiver, TaskSender};
use crate::tasks::TaskHandlers;

/// Longest delay between two deliveries of the same task.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Redelivery policy and concurrency limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum tasks executing at once.
    pub concurrency: usize,
    /// Deliveries per task before a retryable failure is given up on.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff.
    pub retry_base: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            max_attempts: 5,
            retry_base: Duration::from_millis(500),
        }
    }
}

/// Delay before delivery `attempt + 1`: `base * 2^(attempt - 1)`, capped.
#[must_use]
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << exponent).min(MAX_RETRY_DELAY)
}

/// Whether a failed delivery should be tried again.
#[must_use]
pub const fn should_retry(
    task: &Task,
    error: &RelayError,
    attempt: u32,
    max_attempts: u32,
) -> bool {
    error.is_retriable() && (attempt < max_attempts || matches!(task, Task::SwarmConnect))
}

/// Executes queued tasks.
pub struct Worker {
    handlers: Arc<TaskHandlers>,
    tasks: TaskSender,
    receiver: TaskReceiver,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker over the task queue. `tasks` is used for redelivery.
    #[must_use]
    pub fn new(
        handlers: Arc<TaskHandlers>,
        tasks: TaskSender,
        receiver: TaskReceiver,
        config: WorkerConfig,
    ) -> Self {
        Self {
            handlers,
            tasks,
            receiver,
            config,
        }
    }

    /// Run until the queue closes.
    pub async fn run(mut self) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        info!(concurrency = self.config.concurrency, "Starting task worker");

        while let Some(delivery) = self.receiver.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let handlers = Arc::clone(&self.handlers);
            let tasks = self.tasks.clone();
            let config = self.config;

            tokio::spawn(async move {
                let _permit = permit;
                process(&handlers, &tasks, config, delivery).await;
            });
        }

        warn!("Task worker exited");
    }
}

async fn process(
    handlers: &TaskHandlers,
    tasks: &TaskSender,
    config: WorkerConfig,
    delivery: Delivery,
) {
    let name = delivery.task.name();
    let attempt = delivery.attempt;

    let Err(e) = handlers.handle(&delivery.task).await else {
        debug!(task = name, attempt, "Task completed");
        return;
    };

    if should_retry(&delivery.task, &e, attempt, config.max_attempts) {
        let delay = retry_delay(config.retry_base, attempt);
        warn!(task = name, attempt, delay_ms = delay.as_millis(), error = %e, "Task failed, will retry");

        let tasks = tasks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tasks.send(delivery.redeliver()).is_err() {
                error!(task = name, "Task queue closed, dropping redelivery");
            }
        });
    } else if e.is_retriable() {
        error!(task = name, attempt, error = %e, "Task failed, giving up");
    } else if matches!(e, RelayError::ContainerGone { .. }) {
        info!(task = name, error = %e, "Task dropped");
    } else {
        warn!(task = name, error = %e, "Task failed permanently");
    }
}
