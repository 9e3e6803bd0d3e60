//! Docker engine and swarm adapters for dock-relay.
//!
//! This crate provides the capability traits the relay talks to docker through,
//! and their HTTP implementations:
//!
//! - [`EngineApi`] / [`HttpEngine`]: one docker daemon (inspect, list, top, events)
//! - [`ClusterApi`] / [`SwarmTopology`]: the cluster manager's node topology
//! - [`DockerConnector`] / [`HttpConnector`]: hands out adapters by target
//! - [`FrameBuffer`]: reassembles newline-delimited events from stream chunks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Listeners / Task handlers                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       DockerConnector                            │
//! │  ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐    │
//! │  │  engine(host)   │ │ cluster_engine  │ │    cluster      │    │
//! │  │  HttpEngine     │ │  HttpEngine     │ │  SwarmTopology  │    │
//! │  └─────────────────┘ └─────────────────┘ └─────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Docker hosts  +  Swarm manager (remote API)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dock_relay_core::HostAddr;
//! use dock_relay_docker::{DockerConfig, DockerConnector, EventsQuery, HttpConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let swarm = HostAddr::parse("10.0.0.100:2375")?;
//! let connector = HttpConnector::new(swarm, DockerConfig::default())?;
//!
//! for node in connector.cluster().list_nodes().await? {
//!     println!("{} -> {}", node.name, node.host);
//! }
//!
//! let host = HostAddr::parse("10.4.132.87:4242")?;
//! let _stream = connector
//!     .engine(&host)
//!     .events(&EventsQuery::new(["create", "start", "die", "top"]))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature for [`MockDocker`], an in-memory fleet with
//! scriptable event feeds:
//!
//! ```ignore
//! use dock_relay_core::HostAddr;
//! use dock_relay_docker::{DockerConnector, EventsQuery, MockDocker};
//!
//! let docker = MockDocker::new(HostAddr::parse("10.0.0.100:2375")?);
//! let host = HostAddr::parse("10.0.0.1:4242")?;
//! let stream = docker.engine(&host).events(&EventsQuery::new(["start"])).await?;
//! docker.push_frame(&host, b"{\"status\":\"start\",\"id\":\"abc\",\"time\":1}\n");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod connector;
pub mod engine;
pub mod error;
pub mod frame;
pub mod swarm;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use connector::{DockerConnector, HttpConnector};
pub use engine::{EngineApi, HttpEngine};
pub use error::{DockerError, Result};
pub use frame::{FrameBuffer, MAX_PENDING_BYTES};
pub use swarm::{parse_system_status, ClusterApi, SwarmTopology};
pub use types::{ClusterNode, ContainerSummary, DockerConfig, EventStream, EventsQuery};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockDocker, MockFailure};
