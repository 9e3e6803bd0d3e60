//! HTTP status surface.
//!
//! # Routes
//!
//! - `GET /` - Service banner
//! - `GET /status` - Cluster connection and event totals
//! - `GET /stats` - Full counter snapshot
//! - `POST /tasks/:name` - Enqueue an inbound task
//!
//! Anything else answers 404 `{"message": "route not implemented"}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::RelayError;
use crate::messages::Task;
use crate::publisher::Publisher;
use crate::registry::ListenerRegistry;
use crate::service::RelayService;
use crate::stats::{RelayStats, StatsSnapshot};

/// Banner returned by `GET /`.
pub const BANNER: &str = "dock-relay: docker event relay";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live listeners.
    pub registry: Arc<ListenerRegistry>,
    /// Event counters.
    pub stats: Arc<RelayStats>,
    /// Where inbound tasks are enqueued.
    pub publisher: Arc<dyn Publisher>,
    /// Deployment environment.
    pub env: String,
}

impl AppState {
    /// Build the state from an assembled service.
    #[must_use]
    pub fn from_service(service: &RelayService, env: impl Into<String>) -> Self {
        Self {
            registry: Arc::clone(service.registry()),
            stats: Arc::clone(service.stats()),
            publisher: Arc::clone(service.publisher()),
            env: env.into(),
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Whether the cluster listener is connected.
    pub docker_connected: bool,
    /// Total routed events.
    pub count_events: u64,
    /// Deployment environment.
    pub env: String,
    /// Time of the newest routed event (unix seconds).
    pub last_event_time: Option<u64>,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = MessageBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Create the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/tasks/:name", post(enqueue_task))
        .fallback(not_implemented)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn banner() -> &'static str {
    BANNER
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let docker_connected = state
        .registry
        .cluster_listener()
        .is_some_and(|listener| listener.is_connected());

    Json(StatusResponse {
        docker_connected,
        count_events: state.stats.count_events(),
        env: state.env.clone(),
        last_event_time: state.stats.last_event_time(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

async fn enqueue_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, RelayError> {
    let payload = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| RelayError::InvalidTask {
            name: name.clone(),
            reason: e.to_string(),
        })?
    };

    let task = Task::decode(&name, payload)?;
    state.publisher.publish_task(task).await?;
    debug!(task = %name, "Accepted task over HTTP");

    Ok(StatusCode::ACCEPTED)
}

async fn not_implemented() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(MessageBody {
            message: "route not implemented".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum_test::TestServer;
    use dock_relay_core::HostAddr;
    use dock_relay_docker::{DockerConnector, MockDocker};
    use serde_json::{json, Value};

    use super::*;
    use crate::messages::HostJob;
    use crate::publisher::mock::RecordingPublisher;
    use crate::since_map::SinceMap;

    struct Harness {
        server: TestServer,
        docker: MockDocker,
        registry: Arc<ListenerRegistry>,
        stats: Arc<RelayStats>,
        publisher: Arc<RecordingPublisher>,
    }

    fn harness() -> Harness {
        let docker = MockDocker::new(HostAddr::parse("10.0.0.100:2375").unwrap());
        let connector: Arc<dyn DockerConnector> = Arc::new(docker.clone());
        let publisher = Arc::new(RecordingPublisher::new());
        let registry = Arc::new(ListenerRegistry::new(
            connector,
            Arc::new(SinceMap::new()),
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            Duration::from_secs(60),
        ));
        let stats = Arc::new(RelayStats::new());

        let state = AppState {
            registry: Arc::clone(&registry),
            stats: Arc::clone(&stats),
            publisher: Arc::clone(&publisher) as Arc<dyn Publisher>,
            env: "test".to_string(),
        };
        let server = TestServer::new(create_router(state)).unwrap();

        Harness {
            server,
            docker,
            registry,
            stats,
            publisher,
        }
    }

    #[tokio::test]
    async fn root_returns_banner() {
        let h = harness();
        let response = h.server.get("/").await;
        response.assert_status_ok();
        assert_eq!(response.text(), BANNER);
    }

    #[tokio::test]
    async fn status_reports_disconnected_before_cluster_listener() {
        let h = harness();
        let response = h.server.get("/status").await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({
                "docker_connected": false,
                "count_events": 0,
                "env": "test",
                "last_event_time": null,
            })
        );
    }

    #[tokio::test]
    async fn status_reports_cluster_connection_and_counts() {
        let h = harness();
        assert!(h.registry.start_cluster_listener().await.unwrap());
        h.stats.record_event("start", "http://10.0.0.1:4242", Some("1"), 1_700_000_000);

        let body = h.server.get("/status").await.json::<Value>();
        assert_eq!(body["docker_connected"], json!(true));
        assert_eq!(body["count_events"], json!(1));
        assert_eq!(body["last_event_time"], json!(1_700_000_000));
        assert_eq!(h.docker.streams_opened(h.docker.cluster_host()), 1);
    }

    #[tokio::test]
    async fn stats_returns_snapshot() {
        let h = harness();
        h.stats.record_event("die", "http://10.0.0.1:4242", Some("1"), 10);

        let body = h.server.get("/stats").await.json::<Value>();
        assert_eq!(body["count_events"], json!(1));
        assert_eq!(body["by_status"][0]["status"], json!("die"));
    }

    #[tokio::test]
    async fn valid_task_is_enqueued() {
        let h = harness();
        let response = h
            .server
            .post("/tasks/docker.events-stream.connect")
            .json(&json!({"host": "http://10.0.0.1:4242", "org": "1"}))
            .await;

        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(
            h.publisher.tasks(),
            vec![Task::StreamConnect(HostJob {
                host: HostAddr::parse("10.0.0.1:4242").unwrap(),
                org: "1".into(),
            })]
        );
    }

    #[tokio::test]
    async fn unit_task_accepts_empty_body() {
        let h = harness();
        let response = h.server.post("/tasks/time.five-minutes.passed").await;
        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(h.publisher.task_names(), vec!["time.five-minutes.passed"]);
    }

    #[tokio::test]
    async fn invalid_task_is_rejected() {
        let h = harness();
        let response = h
            .server
            .post("/tasks/docker.events-stream.connect")
            .json(&json!({"host": "http://10.0.0.1:4242", "org": ""}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["message"]
            .as_str()
            .unwrap()
            .contains("org"));
        assert!(h.publisher.tasks().is_empty());
    }

    #[tokio::test]
    async fn unknown_task_is_rejected() {
        let h = harness();
        let response = h.server.post("/tasks/nope").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_not_implemented() {
        let h = harness();
        let response = h.server.get("/nowhere").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({"message": "route not implemented"})
        );
    }
}
