//! Outbound publishing.
//!
//! Tasks go onto the in-process task queue consumed by the [`Worker`](crate::Worker);
//! notifications are relayed to downstream consumers over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::messages::{Notification, Task};

/// Durable publishing of tasks and notifications.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Enqueue a task.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Publish` if the task could not be enqueued.
    async fn publish_task(&self, task: Task) -> Result<()>;

    /// Publish a notification.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Publish` if the notification could not be delivered.
    async fn publish_notification(&self, notification: Notification) -> Result<()>;
}

/// A task on the queue, with its delivery count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The task.
    pub task: Task,
    /// Delivery number, starting at 1.
    pub attempt: u32,
}

impl Delivery {
    /// First delivery of a task.
    #[must_use]
    pub const fn new(task: Task) -> Self {
        Self { task, attempt: 1 }
    }

    /// The next delivery of the same task.
    #[must_use]
    pub fn redeliver(self) -> Self {
        Self {
            task: self.task,
            attempt: self.attempt.saturating_add(1),
        }
    }
}

/// Sending half of the task queue.
pub type TaskSender = mpsc::UnboundedSender<Delivery>;

/// Receiving half of the task queue.
pub type TaskReceiver = mpsc::UnboundedReceiver<Delivery>;

/// Create the task queue.
#[must_use]
pub fn task_channel() -> (TaskSender, TaskReceiver) {
    mpsc::unbounded_channel()
}

/// Production publisher.
#[derive(Debug, Clone)]
pub struct RelayPublisher {
    tasks: TaskSender,
    client: reqwest::Client,
    publish_url: Option<String>,
}

impl RelayPublisher {
    /// Create a publisher feeding `tasks` and relaying notifications to `publish_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(tasks: TaskSender, publish_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            tasks,
            client,
            publish_url,
        })
    }
}

#[async_trait]
impl Publisher for RelayPublisher {
    async fn publish_task(&self, task: Task) -> Result<()> {
        let name = task.name();
        self.tasks
            .send(Delivery::new(task))
            .map_err(|_| RelayError::Publish(format!("task queue closed, dropped {name}")))?;
        debug!(task = name, "Enqueued task");
        Ok(())
    }

    async fn publish_notification(&self, notification: Notification) -> Result<()> {
        let name = notification.name();
        let payload = notification.payload()?;

        let Some(base) = &self.publish_url else {
            info!(notification = name, payload = %payload, "Notification");
            return Ok(());
        };

        let url = format!("{base}/{name}");
        self.client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RelayError::Publish(format!("{name}: {e}")))?;

        debug!(notification = name, "Published notification");
        Ok(())
    }
}

/// Recording publisher for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, Notification, Publisher, RelayError, Result, Task};
    use parking_lot::Mutex;

    /// A publisher that records everything it is given.
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        tasks: Mutex<Vec<Task>>,
        notifications: Mutex<Vec<Notification>>,
        fail_notifications: Mutex<bool>,
    }

    impl RecordingPublisher {
        /// Create an empty recording publisher.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make notification publishing fail.
        pub fn set_fail_notifications(&self, fail: bool) {
            *self.fail_notifications.lock() = fail;
        }

        /// Every task published so far.
        #[must_use]
        pub fn tasks(&self) -> Vec<Task> {
            self.tasks.lock().clone()
        }

        /// Every notification published so far.
        #[must_use]
        pub fn notifications(&self) -> Vec<Notification> {
            self.notifications.lock().clone()
        }

        /// Names of the notifications published so far, in order.
        #[must_use]
        pub fn notification_names(&self) -> Vec<&'static str> {
            self.notifications.lock().iter().map(Notification::name).collect()
        }

        /// Names of the tasks published so far, in order.
        #[must_use]
        pub fn task_names(&self) -> Vec<&'static str> {
            self.tasks.lock().iter().map(Task::name).collect()
        }

        /// Remove and return the recorded tasks.
        pub fn take_tasks(&self) -> Vec<Task> {
            std::mem::take(&mut *self.tasks.lock())
        }

        /// Forget everything recorded.
        pub fn clear(&self) {
            self.tasks.lock().clear();
            self.notifications.lock().clear();
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish_task(&self, task: Task) -> Result<()> {
            self.tasks.lock().push(task);
            Ok(())
        }

        async fn publish_notification(&self, notification: Notification) -> Result<()> {
            if *self.fail_notifications.lock() {
                return Err(RelayError::Publish(format!(
                    "{}: mock failure",
                    notification.name()
                )));
            }
            self.notifications.lock().push(notification);
            Ok(())
        }
    }
}
