//! In-memory docker adapters for testing without real daemons.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dock_relay_core::HostAddr;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connector::DockerConnector;
use crate::engine::EngineApi;
use crate::swarm::ClusterApi;
use crate::types::{ClusterNode, ContainerSummary, EventStream, EventsQuery};
use crate::{DockerError, Result};

/// How a mocked inspection should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The container is gone (HTTP 404).
    NotFound,
    /// The daemon errors out (HTTP 500).
    ServerError,
}

type FeedSender = mpsc::UnboundedSender<Result<Vec<u8>>>;

#[derive(Default)]
struct MockState {
    containers: Mutex<HashMap<String, serde_json::Value>>,
    inspect_failures: Mutex<HashMap<String, MockFailure>>,
    inspections: Mutex<Vec<(HostAddr, String)>>,
    nodes: Mutex<Vec<ClusterNode>>,
    topology_down: Mutex<bool>,
    feeds: Mutex<HashMap<HostAddr, Vec<FeedSender>>>,
    event_queries: Mutex<Vec<(HostAddr, EventsQuery)>>,
    refused_hosts: Mutex<HashSet<HostAddr>>,
    failing_probes: Mutex<HashSet<HostAddr>>,
    probes: Mutex<Vec<HostAddr>>,
}

/// A mock docker fleet: hosts, containers, cluster topology and live event feeds.
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct MockDocker {
    cluster_host: HostAddr,
    state: Arc<MockState>,
}

impl MockDocker {
    /// Create a mock fleet managed from `cluster_host`.
    #[must_use]
    pub fn new(cluster_host: HostAddr) -> Self {
        Self {
            cluster_host,
            state: Arc::new(MockState::default()),
        }
    }

    /// Build a cluster node descriptor.
    ///
    /// # Panics
    ///
    /// Panics if `host` is not a valid address.
    #[must_use]
    pub fn node(host: &str, org: &str) -> ClusterNode {
        let host = HostAddr::parse(host).expect("valid mock host");
        ClusterNode {
            name: format!("ip-{}.{org}", host.ip().replace('.', "-")),
            host,
            org: Some(org.to_string()),
            status: "Healthy".to_string(),
            labels: HashMap::from([("org".to_string(), org.to_string())]),
        }
    }

    /// Register a container and its inspection document.
    pub fn add_container(&self, id: &str, inspect: serde_json::Value) {
        self.state.containers.lock().insert(id.to_string(), inspect);
    }

    /// Make inspections of `id` fail.
    pub fn fail_inspect(&self, id: &str, failure: MockFailure) {
        self.state
            .inspect_failures
            .lock()
            .insert(id.to_string(), failure);
    }

    /// Replace the cluster topology.
    pub fn set_nodes(&self, nodes: Vec<ClusterNode>) {
        *self.state.nodes.lock() = nodes;
    }

    /// Add a node to the cluster topology.
    pub fn add_node(&self, node: ClusterNode) {
        self.state.nodes.lock().push(node);
    }

    /// Remove a host from the cluster topology.
    pub fn remove_node(&self, host: &HostAddr) {
        self.state.nodes.lock().retain(|n| &n.host != host);
    }

    /// Make topology queries fail.
    pub fn set_topology_down(&self, down: bool) {
        *self.state.topology_down.lock() = down;
    }

    /// Make opening an event stream on `host` fail.
    pub fn refuse_events(&self, host: &HostAddr) {
        self.state.refused_hosts.lock().insert(host.clone());
    }

    /// Let event streams on `host` open again.
    pub fn accept_events(&self, host: &HostAddr) {
        self.state.refused_hosts.lock().remove(host);
    }

    /// Make liveness probes against `host` fail.
    pub fn fail_probe(&self, host: &HostAddr) {
        self.state.failing_probes.lock().insert(host.clone());
    }

    /// Deliver a chunk on every open stream of `host`. Returns how many streams got it.
    pub fn push_frame(&self, host: &HostAddr, chunk: &[u8]) -> usize {
        let mut feeds = self.state.feeds.lock();
        let Some(senders) = feeds.get_mut(host) else {
            return 0;
        };
        senders.retain(|tx| tx.send(Ok(chunk.to_vec())).is_ok());
        senders.len()
    }

    /// Fail every open stream of `host` with the given message.
    pub fn fail_stream(&self, host: &HostAddr, message: &str) {
        if let Some(senders) = self.state.feeds.lock().remove(host) {
            for tx in senders {
                let _ = tx.send(Err(DockerError::Stream(message.to_string())));
            }
        }
    }

    /// End every open stream of `host`.
    pub fn end_stream(&self, host: &HostAddr) {
        self.state.feeds.lock().remove(host);
    }

    /// Every event stream opened so far, with its query.
    #[must_use]
    pub fn event_queries(&self) -> Vec<(HostAddr, EventsQuery)> {
        self.state.event_queries.lock().clone()
    }

    /// Number of event streams opened against `host`.
    #[must_use]
    pub fn streams_opened(&self, host: &HostAddr) -> usize {
        self.state
            .event_queries
            .lock()
            .iter()
            .filter(|(h, _)| h == host)
            .count()
    }

    /// Number of probes issued against `host`.
    #[must_use]
    pub fn probe_count(&self, host: &HostAddr) -> usize {
        self.state.probes.lock().iter().filter(|h| *h == host).count()
    }

    /// Number of inspections issued.
    #[must_use]
    pub fn inspect_count(&self) -> usize {
        self.state.inspections.lock().len()
    }

    fn engine_for(&self, host: HostAddr) -> Arc<dyn EngineApi> {
        Arc::new(MockEngine {
            host,
            state: Arc::clone(&self.state),
        })
    }
}

struct MockEngine {
    host: HostAddr,
    state: Arc<MockState>,
}

#[async_trait]
impl EngineApi for MockEngine {
    fn host(&self) -> &HostAddr {
        &self.host
    }

    async fn inspect_container(&self, id: &str) -> Result<serde_json::Value> {
        self.state
            .inspections
            .lock()
            .push((self.host.clone(), id.to_string()));

        match self.state.inspect_failures.lock().get(id) {
            Some(MockFailure::NotFound) => {
                return Err(DockerError::NotFound(format!("container {id}")))
            }
            Some(MockFailure::ServerError) => {
                return Err(DockerError::Api {
                    status: 500,
                    message: "mock daemon error".to_string(),
                })
            }
            None => {}
        }

        self.state
            .containers
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| DockerError::NotFound(format!("container {id}")))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .state
            .containers
            .lock()
            .keys()
            .map(|id| ContainerSummary {
                id: id.clone(),
                image: String::new(),
                state: "running".to_string(),
                labels: HashMap::new(),
            })
            .collect())
    }

    async fn top_container(&self, id: &str) -> Result<serde_json::Value> {
        if self.state.containers.lock().contains_key(id) {
            Ok(serde_json::json!({ "Titles": ["PID"], "Processes": [] }))
        } else {
            Err(DockerError::NotFound(format!("container {id}")))
        }
    }

    async fn events(&self, query: &EventsQuery) -> Result<EventStream> {
        self.state
            .event_queries
            .lock()
            .push((self.host.clone(), query.clone()));

        if self.state.refused_hosts.lock().contains(&self.host) {
            return Err(DockerError::Api {
                status: 503,
                message: "mock connection refused".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .feeds
            .lock()
            .entry(self.host.clone())
            .or_default()
            .push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn probe(&self) -> Result<()> {
        self.state.probes.lock().push(self.host.clone());
        if self.state.failing_probes.lock().contains(&self.host) {
            return Err(DockerError::Api {
                status: 500,
                message: "mock probe failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for MockDocker {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        if *self.state.topology_down.lock() {
            return Err(DockerError::Api {
                status: 503,
                message: "mock swarm unavailable".to_string(),
            });
        }
        Ok(self.state.nodes.lock().clone())
    }
}

impl DockerConnector for MockDocker {
    fn cluster_host(&self) -> &HostAddr {
        &self.cluster_host
    }

    fn engine(&self, host: &HostAddr) -> Arc<dyn EngineApi> {
        self.engine_for(host.clone())
    }

    fn cluster_engine(&self) -> Arc<dyn EngineApi> {
        self.engine_for(self.cluster_host.clone())
    }

    fn cluster(&self) -> Arc<dyn ClusterApi> {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn host(s: &str) -> HostAddr {
        HostAddr::parse(s).unwrap()
    }

    #[tokio::test]
    async fn mock_feed_delivers_frames() {
        let docker = MockDocker::new(host("10.0.0.100:2375"));
        let h = host("10.0.0.1:4242");

        let mut stream = docker
            .engine(&h)
            .events(&EventsQuery::new(["start"]))
            .await
            .unwrap();
        assert_eq!(docker.streams_opened(&h), 1);

        assert_eq!(docker.push_frame(&h, b"{}\n"), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), b"{}\n".to_vec());

        docker.end_stream(&h);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn mock_inspect_failures() {
        let docker = MockDocker::new(host("10.0.0.100:2375"));
        let engine = docker.engine(&host("10.0.0.1:4242"));

        docker.add_container("abc", serde_json::json!({ "Id": "abc" }));
        assert_eq!(engine.inspect_container("abc").await.unwrap()["Id"], "abc");

        docker.fail_inspect("abc", MockFailure::ServerError);
        assert!(engine.inspect_container("abc").await.unwrap_err().is_retriable());

        assert!(engine.inspect_container("nope").await.unwrap_err().is_not_found());
        assert_eq!(docker.inspect_count(), 3);
    }

    #[tokio::test]
    async fn mock_topology() {
        let docker = MockDocker::new(host("10.0.0.100:2375"));
        docker.add_node(MockDocker::node("10.0.0.1:4242", "1234"));

        let cluster = docker.cluster();
        assert!(cluster.host_exists(&host("10.0.0.1:4242")).await.unwrap());

        docker.remove_node(&host("10.0.0.1:4242"));
        assert!(!cluster.host_exists(&host("10.0.0.1:4242")).await.unwrap());

        docker.set_topology_down(true);
        assert!(cluster.list_nodes().await.is_err());
    }
}
