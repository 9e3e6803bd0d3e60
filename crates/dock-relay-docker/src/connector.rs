//! Adapter selection.
//!
//! Listeners and task handlers never build clients themselves; they ask a
//! [`DockerConnector`] for the adapter matching the target: a single host's
//! engine, the cluster manager's engine, or the cluster topology.

use std::sync::Arc;

use dock_relay_core::HostAddr;

use crate::engine::{EngineApi, HttpEngine};
use crate::swarm::{ClusterApi, SwarmTopology};
use crate::types::DockerConfig;
use crate::{DockerError, Result};

/// Hands out docker adapters by target.
pub trait DockerConnector: Send + Sync {
    /// Address of the cluster manager.
    fn cluster_host(&self) -> &HostAddr;

    /// Engine client for a single docker host.
    fn engine(&self, host: &HostAddr) -> Arc<dyn EngineApi>;

    /// Engine client for the cluster manager's aggregated feed.
    fn cluster_engine(&self) -> Arc<dyn EngineApi>;

    /// Topology client for the cluster manager.
    fn cluster(&self) -> Arc<dyn ClusterApi>;
}

/// HTTP-backed connector sharing one connection pool across all hosts.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    config: DockerConfig,
    swarm: HttpEngine,
}

impl HttpConnector {
    /// Create a connector for the given cluster manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(swarm_host: HostAddr, config: DockerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| DockerError::Config(format!("Failed to create HTTP client: {e}")))?;

        let swarm = HttpEngine::with_client(client.clone(), swarm_host, config.request_timeout);

        Ok(Self {
            client,
            config,
            swarm,
        })
    }
}

impl DockerConnector for HttpConnector {
    fn cluster_host(&self) -> &HostAddr {
        self.swarm.host()
    }

    fn engine(&self, host: &HostAddr) -> Arc<dyn EngineApi> {
        Arc::new(HttpEngine::with_client(
            self.client.clone(),
            host.clone(),
            self.config.request_timeout,
        ))
    }

    fn cluster_engine(&self) -> Arc<dyn EngineApi> {
        Arc::new(self.swarm.clone())
    }

    fn cluster(&self) -> Arc<dyn ClusterApi> {
        Arc::new(SwarmTopology::new(self.swarm.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_targets() {
        let swarm = HostAddr::parse("10.0.0.100:2375").unwrap();
        let connector = HttpConnector::new(swarm.clone(), DockerConfig::default()).unwrap();

        assert_eq!(connector.cluster_host(), &swarm);
        assert_eq!(connector.cluster_engine().host(), &swarm);

        let host = HostAddr::parse("10.0.0.1:4242").unwrap();
        assert_eq!(connector.engine(&host).host(), &host);
    }
}
