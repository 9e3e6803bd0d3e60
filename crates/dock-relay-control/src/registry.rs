//! Listener registry.
//!
//! Tracks the cluster listener and at most one listener per docker host, and
//! turns listener closes into reconnect tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dock_relay_core::HostAddr;
use dock_relay_docker::{ClusterNode, DockerConnector};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::lifecycle::ListenerKind;
use crate::listener::{EventListener, ListenerClosed, ListenerContext};
use crate::messages::{HostJob, Task};
use crate::publisher::Publisher;
use crate::since_map::SinceMap;

/// The set of live event listeners.
pub struct ListenerRegistry {
    ctx: ListenerContext,
    cluster: RwLock<Option<Arc<EventListener>>>,
    listeners: RwLock<HashMap<HostAddr, Arc<EventListener>>>,
    closed_rx: Mutex<Option<mpsc::UnboundedReceiver<ListenerClosed>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(
        connector: Arc<dyn DockerConnector>,
        since: Arc<SinceMap>,
        publisher: Arc<dyn Publisher>,
        liveness_timeout: Duration,
    ) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        Self {
            ctx: ListenerContext {
                connector,
                since,
                publisher,
                liveness_timeout,
                closed_tx,
            },
            cluster: RwLock::new(None),
            listeners: RwLock::new(HashMap::new()),
            closed_rx: Mutex::new(Some(closed_rx)),
        }
    }

    /// Start the cluster listener unless one is already registered.
    ///
    /// Returns `true` if a new listener was started.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ListenerStart` if the cluster stream cannot be opened.
    pub async fn start_cluster_listener(&self) -> Result<bool> {
        let listener = {
            let mut cluster = self.cluster.write();
            if cluster.is_some() {
                debug!("Cluster listener already running");
                return Ok(false);
            }
            let listener = Arc::new(EventListener::for_cluster(self.ctx.clone()));
            *cluster = Some(Arc::clone(&listener));
            listener
        };

        if let Err(e) = listener.start().await {
            self.evict(ListenerKind::Cluster, listener.host(), listener.id());
            return Err(e);
        }
        Ok(true)
    }

    /// Start a listener for `host` unless one is already registered.
    ///
    /// Returns `true` if a new listener was started.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ListenerStart` if the host stream cannot be opened.
    pub async fn start_host_listener(&self, host: HostAddr, org: Option<String>) -> Result<bool> {
        let listener = {
            let mut listeners = self.listeners.write();
            if listeners.contains_key(&host) {
                debug!(host = %host, "Host listener already running");
                return Ok(false);
            }
            let listener = Arc::new(EventListener::for_host(host.clone(), org, self.ctx.clone()));
            listeners.insert(host, Arc::clone(&listener));
            listener
        };

        if let Err(e) = listener.start().await {
            self.evict(ListenerKind::Host, listener.host(), listener.id());
            return Err(e);
        }
        Ok(true)
    }

    /// Stop and forget the listener for `host`, and its watermark.
    ///
    /// Returns `true` if a listener was registered.
    pub fn remove_listener(&self, host: &HostAddr) -> bool {
        let removed = self.listeners.write().remove(host);
        self.ctx.since.forget(host);

        match removed {
            Some(listener) => {
                listener.stop();
                info!(host = %host, "Removed host listener");
                true
            }
            None => false,
        }
    }

    /// Check if a listener is registered for `host`.
    #[must_use]
    pub fn has_listener(&self, host: &HostAddr) -> bool {
        self.listeners.read().contains_key(host)
    }

    /// Get the listener registered for `host`.
    #[must_use]
    pub fn get(&self, host: &HostAddr) -> Option<Arc<EventListener>> {
        self.listeners.read().get(host).cloned()
    }

    /// All registered host listeners.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<EventListener>> {
        self.listeners.read().values().cloned().collect()
    }

    /// The cluster listener, if registered.
    #[must_use]
    pub fn cluster_listener(&self) -> Option<Arc<EventListener>> {
        self.cluster.read().clone()
    }

    /// Number of registered host listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Check if no host listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Request a connect for every node without a listener.
    ///
    /// Never removes listeners: a transient topology read must not drop a
    /// healthy stream. Returns the number of connects requested.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Publish` if a connect task cannot be enqueued.
    pub async fn reconcile(&self, nodes: &[ClusterNode]) -> Result<usize> {
        let missing: Vec<&ClusterNode> = {
            let listeners = self.listeners.read();
            nodes
                .iter()
                .filter(|node| !listeners.contains_key(&node.host))
                .collect()
        };

        let mut requested = 0;
        for node in missing {
            let Some(org) = node.org.clone() else {
                warn!(node = %node.name, host = %node.host, "Skipping node without org");
                continue;
            };
            self.ctx
                .publisher
                .publish_task(Task::StreamConnect(HostJob {
                    host: node.host.clone(),
                    org,
                }))
                .await?;
            requested += 1;
        }

        info!(nodes = nodes.len(), requested, "Reconciled listeners");
        Ok(requested)
    }

    /// Consume close notifications for the life of the process.
    ///
    /// Only one supervisor runs per registry; later calls return immediately.
    pub async fn run_supervisor(self: Arc<Self>) {
        let Some(mut closed_rx) = self.closed_rx.lock().take() else {
            warn!("Listener supervisor already running");
            return;
        };

        info!("Starting listener supervisor");

        while let Some(closed) = closed_rx.recv().await {
            self.handle_closed(closed).await;
        }
    }

    /// Apply the close policy to one closed listener.
    pub async fn handle_closed(&self, closed: ListenerClosed) {
        let evicted = self.evict(closed.kind, &closed.host, closed.id);

        if !evicted || !closed.reason.should_reconnect() {
            debug!(host = %closed.host, reason = %closed.reason, "No reconnect needed");
            return;
        }

        let task = match closed.kind {
            ListenerKind::Cluster => Task::SwarmConnect,
            ListenerKind::Host => Task::StreamConnect(HostJob {
                host: closed.host.clone(),
                org: closed.org.unwrap_or_default(),
            }),
        };

        info!(host = %closed.host, kind = %closed.kind, "Requesting reconnect");
        if let Err(e) = self.ctx.publisher.publish_task(task).await {
            warn!(host = %closed.host, error = %e, "Failed to request reconnect");
        }
    }

    /// Remove an entry only if it still holds the listener with `id`.
    fn evict(&self, kind: ListenerKind, host: &HostAddr, id: Uuid) -> bool {
        match kind {
            ListenerKind::Cluster => {
                let mut cluster = self.cluster.write();
                if cluster.as_ref().is_some_and(|l| l.id() == id) {
                    *cluster = None;
                    true
                } else {
                    false
                }
            }
            ListenerKind::Host => {
                let mut listeners = self.listeners.write();
                if listeners.get(host).is_some_and(|l| l.id() == id) {
                    listeners.remove(host);
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::CloseReason;
    use crate::publisher::mock::RecordingPublisher;
    use dock_relay_docker::MockDocker;

    fn host(s: &str) -> HostAddr {
        HostAddr::parse(s).unwrap()
    }

    fn registry() -> (Arc<ListenerRegistry>, MockDocker, Arc<RecordingPublisher>, Arc<SinceMap>) {
        let docker = MockDocker::new(host("10.0.0.100:2375"));
        let publisher = Arc::new(RecordingPublisher::new());
        let since = Arc::new(SinceMap::new());
        let registry = Arc::new(ListenerRegistry::new(
            Arc::new(docker.clone()),
            Arc::clone(&since),
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            Duration::from_secs(60),
        ));
        (registry, docker, publisher, since)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_settle_to_one_listener() {
        let (registry, docker, _, _) = registry();
        let h = host("10.0.0.1:4242");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let h = h.clone();
                tokio::spawn(async move { registry.start_host_listener(h, Some("1".into())).await })
            })
            .collect();

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(docker.streams_opened(&h), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (registry, docker, _, _) = registry();
        let h = host("10.0.0.1:4242");

        assert!(registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap());
        assert!(!registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap());
        assert!(registry.has_listener(&h));
        assert_eq!(docker.streams_opened(&h), 1);

        assert!(registry.start_cluster_listener().await.unwrap());
        assert!(!registry.start_cluster_listener().await.unwrap());
        assert!(registry.cluster_listener().unwrap().is_connected());
    }

    #[tokio::test]
    async fn failed_start_leaves_no_entry() {
        let (registry, docker, _, _) = registry();
        let h = host("10.0.0.1:4242");
        docker.refuse_events(&h);

        assert!(registry.start_host_listener(h.clone(), Some("1".into())).await.is_err());
        assert!(!registry.has_listener(&h));

        docker.accept_events(&h);
        assert!(registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap());
    }

    #[tokio::test]
    async fn remove_forgets_watermark() {
        let (registry, _, _, since) = registry();
        let h = host("10.0.0.1:4242");
        registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap();
        since.set(&h, 1500);

        let listener = registry.get(&h).unwrap();
        assert!(registry.remove_listener(&h));
        assert!(!registry.has_listener(&h));
        assert_eq!(since.get(&h), 0);

        settle().await;
        assert_eq!(listener.state(), crate::lifecycle::ListenerState::Closed);
        assert!(!registry.remove_listener(&h));
    }

    #[tokio::test]
    async fn reconcile_requests_missing_hosts_only() {
        let (registry, _, publisher, _) = registry();
        let known = host("10.0.0.1:4242");
        registry.start_host_listener(known, Some("1".into())).await.unwrap();

        let mut orphan = MockDocker::node("10.0.0.3:4242", "3");
        orphan.org = None;
        let nodes = vec![
            MockDocker::node("10.0.0.1:4242", "1"),
            MockDocker::node("10.0.0.2:4242", "2"),
            orphan,
        ];

        assert_eq!(registry.reconcile(&nodes).await.unwrap(), 1);
        assert_eq!(
            publisher.tasks(),
            vec![Task::StreamConnect(HostJob {
                host: host("10.0.0.2:4242"),
                org: "2".into()
            })]
        );
        // Reconcile never removes
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn closed_host_listener_requests_reconnect() {
        let (registry, docker, publisher, _) = registry();
        tokio::spawn(Arc::clone(&registry).run_supervisor());

        let h = host("10.0.0.1:4242");
        registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap();
        docker.end_stream(&h);

        for _ in 0..50 {
            if !publisher.tasks().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!registry.has_listener(&h));
        assert_eq!(
            publisher.tasks(),
            vec![Task::StreamConnect(HostJob {
                host: h,
                org: "1".into()
            })]
        );
    }

    #[tokio::test]
    async fn closed_cluster_listener_restarts_itself() {
        let (registry, docker, publisher, _) = registry();
        registry.start_cluster_listener().await.unwrap();
        let listener = registry.cluster_listener().unwrap();

        registry
            .handle_closed(ListenerClosed {
                id: listener.id(),
                host: docker.cluster_host().clone(),
                org: None,
                kind: ListenerKind::Cluster,
                reason: CloseReason::TimedOut,
            })
            .await;

        assert!(registry.cluster_listener().is_none());
        assert_eq!(publisher.tasks(), vec![Task::SwarmConnect]);
    }

    #[tokio::test]
    async fn stale_close_does_not_evict_newer_listener() {
        let (registry, _, publisher, _) = registry();
        let h = host("10.0.0.1:4242");
        registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap();

        registry
            .handle_closed(ListenerClosed {
                id: Uuid::new_v4(),
                host: h.clone(),
                org: Some("1".into()),
                kind: ListenerKind::Host,
                reason: CloseReason::StreamEnded,
            })
            .await;

        assert!(registry.has_listener(&h));
        assert!(publisher.tasks().is_empty());
    }

    #[tokio::test]
    async fn explicit_stop_does_not_reconnect() {
        let (registry, _, publisher, _) = registry();
        tokio::spawn(Arc::clone(&registry).run_supervisor());

        let h = host("10.0.0.1:4242");
        registry.start_host_listener(h.clone(), Some("1".into())).await.unwrap();
        registry.remove_listener(&h);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(publisher.tasks().is_empty());
    }
}
