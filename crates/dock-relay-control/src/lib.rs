//! Control plane of the docker event relay.
//!
//! Keeps one long-lived event stream per cluster host plus one on the cluster
//! manager, enriches every event frame with container and tenant metadata and
//! routes it to downstream consumers as named notifications.
//!
//! # Architecture
//!
//! ```text
//!   ┌───────────────────────┐        ┌────────────────────────────────┐
//!   │  HTTP (/status, ...)  │        │  Ticker (time.five-minutes...) │
//!   └───────────────────────┘        └────────────────────────────────┘
//!               │ POST /tasks/:name                   │
//!               ▼                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Task queue (Delivery)                        │
//! └─────────────────────────────────────────────────────────────────────┘
//!               │                                     ▲
//!               ▼                                     │ docker.event.publish
//! ┌─────────────────────────────┐      ┌─────────────────────────────────┐
//! │   Worker -> TaskHandlers    │─────▶│  ListenerRegistry               │
//! │   (redelivery, backoff)     │      │  ┌──────────┐  ┌──────────────┐ │
//! └─────────────────────────────┘      │  │ cluster  │  │ host, host.. │ │
//!               │                      │  └──────────┘  └──────────────┘ │
//!               ▼                      │  supervisor: close -> reconnect │
//! ┌─────────────────────────────┐      └─────────────────────────────────┘
//! │  EventDispatcher            │
//! │  parse, enrich, blacklist,  │──────▶ Publisher (notifications)
//! │  since, inspect, route      │
//! └─────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use dock_relay_control::{task_channel, RelayConfig, RelayPublisher, RelayService};
//! use dock_relay_docker::HttpConnector;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_env();
//! let connector = Arc::new(HttpConnector::new(config.swarm_host.clone(), config.docker)?);
//! let (tasks, receiver) = task_channel();
//! let publisher = Arc::new(RelayPublisher::new(tasks.clone(), config.publish_url.clone())?);
//!
//! let service = RelayService::new(&config, connector, publisher);
//! let worker = service.worker(tasks, receiver);
//! # drop(worker);
//! # Ok(())
//! # }
//! ```
//!
//! # Listener lifecycle
//!
//! `Idle` → `Connecting` → `Connected` → `Closing` → `Closed`, with a shortcut
//! to `Closed` when the stream never opens. Every listener reports exactly one
//! close to the registry supervisor; see the [`lifecycle`] module.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod http;
pub mod lifecycle;
pub mod listener;
pub mod messages;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod since_map;
pub mod stats;
pub mod tasks;
pub mod worker;

pub use config::RelayConfig;
pub use dispatcher::{DispatchOutcome, DispatcherConfig, EventDispatcher};
pub use error::{RelayError, Result};
pub use event::{format_event, EnrichedEvent, NodeInfo, RawEvent};
pub use http::{create_router, AppState};
pub use lifecycle::{CloseReason, ListenerKind, ListenerState};
pub use listener::{EventListener, ListenerClosed};
pub use messages::{Notification, Task};
pub use publisher::{task_channel, Delivery, Publisher, RelayPublisher, TaskReceiver, TaskSender};
pub use registry::ListenerRegistry;
pub use service::RelayService;
pub use since_map::SinceMap;
pub use stats::{RelayStats, StatsSnapshot};
pub use tasks::TaskHandlers;
pub use worker::{retry_delay, Worker, WorkerConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use publisher::mock::RecordingPublisher;
