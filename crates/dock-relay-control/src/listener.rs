//! Event listener.
//!
//! An [`EventListener`] owns one docker event stream, either a single host's or
//! the cluster manager's, and runs the state machine in [`crate::lifecycle`]:
//!
//! 1. `start()` opens the stream from the host's watermark, arms the liveness
//!    watchdog and fires a probe to make a quiet host emit a `top` event.
//! 2. The run loop forwards every frame as a `docker.event.publish` task.
//! 3. Timeout, stream error, stream end or an explicit close all end in exactly
//!    one [`ListenerClosed`] message to the registry supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dock_relay_core::HostAddr;
use dock_relay_docker::{DockerConnector, EngineApi, EventStream, EventsQuery, FrameBuffer};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::lifecycle::{self, CloseReason, ListenerKind, ListenerState};
use crate::messages::{EventPublishJob, Task};
use crate::publisher::Publisher;
use crate::since_map::SinceMap;

/// Sent once when a listener reaches `Closed` after having streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerClosed {
    /// ID of the closed listener.
    pub id: Uuid,
    /// Host it listened to.
    pub host: HostAddr,
    /// Org of the host.
    pub org: Option<String>,
    /// Cluster or host listener.
    pub kind: ListenerKind,
    /// Why it closed.
    pub reason: CloseReason,
}

/// Collaborators shared by every listener.
#[derive(Clone)]
pub struct ListenerContext {
    /// Adapter selection.
    pub connector: Arc<dyn DockerConnector>,
    /// Watermarks.
    pub since: Arc<SinceMap>,
    /// Where frames are forwarded.
    pub publisher: Arc<dyn Publisher>,
    /// Silence allowed on a fresh stream.
    pub liveness_timeout: Duration,
    /// Close notifications.
    pub closed_tx: mpsc::UnboundedSender<ListenerClosed>,
}

struct ListenerInner {
    state: ListenerState,
    shutdown: Option<oneshot::Sender<CloseReason>>,
    pending_close: Option<CloseReason>,
    last_event_at: Option<DateTime<Utc>>,
}

/// A live subscription to one docker event feed.
pub struct EventListener {
    id: Uuid,
    host: HostAddr,
    org: Option<String>,
    kind: ListenerKind,
    engine: Arc<dyn EngineApi>,
    ctx: ListenerContext,
    inner: Mutex<ListenerInner>,
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("org", &self.org)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl EventListener {
    /// Create an idle listener for a single host.
    #[must_use]
    pub fn for_host(host: HostAddr, org: Option<String>, ctx: ListenerContext) -> Self {
        let engine = ctx.connector.engine(&host);
        Self::with_engine(ListenerKind::Host, host, org, engine, ctx)
    }

    /// Create an idle listener for the cluster manager.
    #[must_use]
    pub fn for_cluster(ctx: ListenerContext) -> Self {
        let engine = ctx.connector.cluster_engine();
        let host = ctx.connector.cluster_host().clone();
        Self::with_engine(ListenerKind::Cluster, host, None, engine, ctx)
    }

    fn with_engine(
        kind: ListenerKind,
        host: HostAddr,
        org: Option<String>,
        engine: Arc<dyn EngineApi>,
        ctx: ListenerContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            host,
            org,
            kind,
            engine,
            ctx,
            inner: Mutex::new(ListenerInner {
                state: ListenerState::Idle,
                shutdown: None,
                pending_close: None,
                last_event_at: None,
            }),
        }
    }

    /// Unique ID of this listener instance.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Host this listener is attached to.
    #[must_use]
    pub const fn host(&self) -> &HostAddr {
        &self.host
    }

    /// Org of the host.
    #[must_use]
    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    /// Cluster or host listener.
    #[must_use]
    pub const fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.inner.lock().state
    }

    /// Check if the stream is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ListenerState::Connected
    }

    /// When the last chunk of data arrived.
    #[must_use]
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_event_at
    }

    /// Open the event stream and start forwarding frames.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ListenerStart` if the stream cannot be opened. The
    /// listener is then `Closed` and sends no close notification; retrying is
    /// the caller's job.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.transition(ListenerState::Connecting)?;

        let since = self.ctx.since.get(&self.host);
        let query = EventsQuery::new(self.kind.watched_events().iter().copied()).since(since);

        let stream = match self.engine.events(&query).await {
            Ok(stream) => stream,
            Err(e) => {
                let mut inner = self.inner.lock();
                inner.state = ListenerState::Closed;
                inner.pending_close = None;
                drop(inner);
                warn!(host = %self.host, kind = %self.kind, error = %e, "Failed to open event stream");
                return Err(RelayError::ListenerStart {
                    host: self.host.clone(),
                    source: e,
                });
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if inner.state == ListenerState::Closing {
                // Closed while the stream was opening
                let reason = inner.pending_close.take().unwrap_or(CloseReason::Stopped);
                drop(inner);
                drop(stream);
                self.finish_close(reason);
                return Ok(());
            }
            inner.state = lifecycle::validate_transition(
                &self.host,
                inner.state,
                ListenerState::Connected,
            )?;
            inner.shutdown = Some(shutdown_tx);
        }

        info!(host = %self.host, kind = %self.kind, since, "Listening for docker events");

        tokio::spawn(Arc::clone(self).run(stream, shutdown_rx));

        let engine = Arc::clone(&self.engine);
        let host = self.host.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.probe().await {
                debug!(host = %host, error = %e, "Start probe failed");
            }
        });

        Ok(())
    }

    /// Run a liveness probe against the host.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ProbeFailed` if the host did not answer.
    pub async fn probe(&self) -> Result<()> {
        self.engine
            .probe()
            .await
            .map_err(|e| RelayError::ProbeFailed {
                host: self.host.clone(),
                message: e.to_string(),
            })
    }

    /// Close the listener.
    ///
    /// Returns `false` if it was already closing or closed; only the first close
    /// takes effect and produces a notification.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ListenerState::Closing | ListenerState::Closed => false,
            ListenerState::Idle => {
                inner.state = ListenerState::Closed;
                true
            }
            ListenerState::Connecting => {
                inner.state = ListenerState::Closing;
                inner.pending_close = Some(reason);
                true
            }
            ListenerState::Connected => {
                inner.state = ListenerState::Closing;
                if let Some(tx) = inner.shutdown.take() {
                    let _ = tx.send(reason);
                }
                true
            }
        }
    }

    /// Stop the listener on request. No reconnect follows.
    pub fn stop(&self) -> bool {
        self.close(CloseReason::Stopped)
    }

    async fn run(self: Arc<Self>, mut stream: EventStream, mut shutdown: oneshot::Receiver<CloseReason>) {
        let mut frames = FrameBuffer::new();
        let watchdog = tokio::time::sleep(self.ctx.liveness_timeout);
        tokio::pin!(watchdog);
        let mut alive = false;

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown => break reason.unwrap_or(CloseReason::Stopped),
                () = &mut watchdog, if !alive => break CloseReason::TimedOut,
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        alive = true;
                        self.inner.lock().last_event_at = Some(Utc::now());
                        match frames.push(&bytes) {
                            Ok(complete) => {
                                for frame in complete {
                                    self.forward(frame).await;
                                }
                            }
                            Err(e) => break CloseReason::StreamError(e.to_string()),
                        }
                    }
                    Some(Err(e)) => break CloseReason::StreamError(e.to_string()),
                    None => break CloseReason::StreamEnded,
                },
            }
        };

        drop(stream);
        self.finish_close(reason);
    }

    async fn forward(&self, frame: Vec<u8>) {
        let event = match String::from_utf8(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(host = %self.host, error = %e, "Dropping malformed event frame: not UTF-8");
                return;
            }
        };
        let task = Task::EventPublish(EventPublishJob {
            host: self.host.clone(),
            org: self.org.clone(),
            event,
        });
        if let Err(e) = self.ctx.publisher.publish_task(task).await {
            warn!(host = %self.host, error = %e, "Failed to forward event frame");
        }
    }

    fn finish_close(&self, reason: CloseReason) {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ListenerState::Closed => return,
                ListenerState::Closing => {}
                _ => inner.state = ListenerState::Closing,
            }
            inner.state = ListenerState::Closed;
            inner.shutdown = None;
        }

        if reason.should_reconnect() {
            warn!(host = %self.host, kind = %self.kind, reason = %reason, "Event listener closed");
        } else {
            info!(host = %self.host, kind = %self.kind, "Event listener stopped");
        }

        let _ = self.ctx.closed_tx.send(ListenerClosed {
            id: self.id,
            host: self.host.clone(),
            org: self.org.clone(),
            kind: self.kind,
            reason,
        });
    }

    fn transition(&self, to: ListenerState) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.state = lifecycle::validate_transition(&self.host, inner.state, to)?;
        Ok(())
    }
}
