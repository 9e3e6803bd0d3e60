//! Cluster topology from the swarm manager.
//!
//! Classic swarm reports its nodes inside `GET /info` as `SystemStatus`, a flat
//! list of `[key, value]` rows:
//!
//! ```text
//! ["Nodes", "2"]
//! [" ip-10-4-132-87.123123123", "10.4.132.87:4242"]
//! ["  └ ID", "YP7Q:..."]
//! ["  └ Status", "Healthy"]
//! ["  └ Labels", "executionDriver=native-0.2, org=123123123"]
//! ```
//!
//! A node row is indented by one space; its properties follow, indented further
//! and prefixed with `└`.

use std::collections::HashMap;

use async_trait::async_trait;
use dock_relay_core::{org_from_node_name, HostAddr};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::HttpEngine;
use crate::types::ClusterNode;
use crate::Result;

/// Topology queries against the cluster manager.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every node known to the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager cannot be reached.
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>>;

    /// Check whether a host is still part of the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager cannot be reached.
    async fn host_exists(&self, host: &HostAddr) -> Result<bool> {
        Ok(self.list_nodes().await?.iter().any(|node| &node.host == host))
    }
}

/// Subset of `GET /info` we care about.
#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(rename = "SystemStatus", default)]
    system_status: Option<Vec<Vec<String>>>,
}

/// Swarm manager topology client.
///
/// Wraps the manager's [`HttpEngine`] rather than extending it: the same engine
/// also serves the cluster-level event stream.
#[derive(Debug, Clone)]
pub struct SwarmTopology {
    engine: HttpEngine,
}

impl SwarmTopology {
    /// Create a topology client over the manager's engine client.
    #[must_use]
    pub const fn new(engine: HttpEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ClusterApi for SwarmTopology {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        let info: InfoResponse = self.engine.get_json("/info", "swarm info").await?;
        let nodes = parse_system_status(&info.system_status.unwrap_or_default());
        debug!(count = nodes.len(), "Fetched swarm nodes");
        Ok(nodes)
    }
}

struct NodeBuilder {
    name: String,
    host: HostAddr,
    status: String,
    labels: HashMap<String, String>,
}

impl NodeBuilder {
    fn build(self) -> ClusterNode {
        let org = self
            .labels
            .get("org")
            .cloned()
            .or_else(|| org_from_node_name(&self.name).map(str::to_string));

        ClusterNode {
            name: self.name,
            host: self.host,
            org,
            status: self.status,
            labels: self.labels,
        }
    }
}

/// Parse swarm `SystemStatus` rows into nodes.
#[must_use]
pub fn parse_system_status(rows: &[Vec<String>]) -> Vec<ClusterNode> {
    let mut nodes = Vec::new();
    let mut current: Option<NodeBuilder> = None;

    for row in rows {
        let [key, value] = row.as_slice() else {
            continue;
        };

        if let Some(property) = key.trim_start().strip_prefix('└') {
            let Some(node) = current.as_mut() else {
                continue;
            };
            match property.trim() {
                "Status" => node.status = value.clone(),
                "Labels" => node.labels = parse_labels(value),
                _ => {}
            }
        } else if key.starts_with(' ') && !key.starts_with("  ") {
            nodes.extend(current.take().map(NodeBuilder::build));

            let name = key.trim().to_string();
            match HostAddr::parse(value) {
                Ok(host) => {
                    current = Some(NodeBuilder {
                        name,
                        host,
                        status: String::new(),
                        labels: HashMap::new(),
                    });
                }
                Err(e) => warn!(node = %name, error = %e, "Skipping swarm node with bad address"),
            }
        }
    }

    nodes.extend(current.map(NodeBuilder::build));
    nodes
}

fn parse_labels(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DockerConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rows(raw: &[(&str, &str)]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|(k, v)| vec![(*k).to_string(), (*v).to_string()])
            .collect()
    }

    fn sample_status() -> Vec<Vec<String>> {
        rows(&[
            ("Role", "primary"),
            ("Strategy", "spread"),
            ("Nodes", "2"),
            (" ip-10-4-132-87.123123123", "10.4.132.87:4242"),
            ("  └ ID", "YP7Q:AAAA"),
            ("  └ Status", "Healthy"),
            ("  └ Labels", "executionDriver=native-0.2, kernelversion=3.13.0, org=123123123"),
            (" ip-10-4-145-68.555", "10.4.145.68:4242"),
            ("  └ Status", "Pending"),
            ("  └ Labels", "executionDriver=native-0.2"),
        ])
    }

    #[test]
    fn parses_nodes_and_properties() {
        let nodes = parse_system_status(&sample_status());
        assert_eq!(nodes.len(), 2);

        assert_eq!(nodes[0].name, "ip-10-4-132-87.123123123");
        assert_eq!(nodes[0].host.address(), "10.4.132.87:4242");
        assert_eq!(nodes[0].org.as_deref(), Some("123123123"));
        assert!(nodes[0].is_healthy());
        assert_eq!(
            nodes[0].labels.get("kernelversion").map(String::as_str),
            Some("3.13.0")
        );

        // No org label: falls back to the node name
        assert_eq!(nodes[1].org.as_deref(), Some("555"));
        assert!(!nodes[1].is_healthy());
    }

    #[test]
    fn skips_malformed_rows() {
        let mut status = rows(&[(" bad-node.1", "not-an-address"), ("  └ Status", "Healthy")]);
        status.push(vec!["lonely".to_string()]);
        assert!(parse_system_status(&status).is_empty());
    }

    #[tokio::test]
    async fn host_exists_via_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "SystemStatus": sample_status() })),
            )
            .mount(&server)
            .await;

        let host = HostAddr::parse(&server.uri()).unwrap();
        let engine = HttpEngine::new(host, &DockerConfig::default()).unwrap();
        let topology = SwarmTopology::new(engine);

        let present = HostAddr::parse("10.4.145.68:4242").unwrap();
        let absent = HostAddr::parse("10.9.9.9:4242").unwrap();
        assert!(topology.host_exists(&present).await.unwrap());
        assert!(!topology.host_exists(&absent).await.unwrap());
    }

    #[tokio::test]
    async fn missing_system_status_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let host = HostAddr::parse(&server.uri()).unwrap();
        let engine = HttpEngine::new(host, &DockerConfig::default()).unwrap();
        let nodes = SwarmTopology::new(engine).list_nodes().await.unwrap();
        assert!(nodes.is_empty());
    }
}
