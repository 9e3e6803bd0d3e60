//! Docker engine adapter.
//!
//! This module provides the [`EngineApi`] capability set for a single docker
//! daemon and its HTTP implementation, [`HttpEngine`]. The cluster manager speaks
//! the same remote API, so the cluster-level listener uses an `HttpEngine` too.

use std::time::Duration;

use async_trait::async_trait;
use dock_relay_core::HostAddr;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::types::{ContainerSummary, DockerConfig, EventStream, EventsQuery};
use crate::{DockerError, Result};

/// Operations against one docker daemon.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Address of the daemon, used for logging.
    fn host(&self) -> &HostAddr;

    /// Fetch the full inspection document of a container.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::NotFound` if the container no longer exists.
    async fn inspect_container(&self, id: &str) -> Result<serde_json::Value>;

    /// List running containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// List the processes of a container. The daemon emits a `top` event for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is gone or not running.
    async fn top_container(&self, id: &str) -> Result<serde_json::Value>;

    /// Open the event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened.
    async fn events(&self, query: &EventsQuery) -> Result<EventStream>;

    /// Round-trip that makes the daemon emit a `top` event.
    ///
    /// Lists containers and runs `top` on the first one. A host with no running
    /// containers succeeds without producing an event.
    ///
    /// # Errors
    ///
    /// Returns an error if either call fails.
    async fn probe(&self) -> Result<()> {
        let containers = self.list_containers().await?;
        if let Some(container) = containers.first() {
            self.top_container(&container.id).await?;
        }
        Ok(())
    }
}

/// Error body returned by the docker daemon.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// HTTP client for the docker remote API.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    host: HostAddr,
    base_url: String,
    request_timeout: Duration,
}

impl HttpEngine {
    /// Create an engine client for the given host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(host: HostAddr, config: &DockerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| DockerError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, host, config.request_timeout))
    }

    /// Create an engine client sharing an existing connection pool.
    ///
    /// The client must not carry a total request timeout, or event streams get cut.
    #[must_use]
    pub fn with_client(client: reqwest::Client, host: HostAddr, request_timeout: Duration) -> Self {
        let base_url = host.to_url();
        Self {
            client,
            host,
            base_url,
            request_timeout,
        }
    }

    /// Get the base URL of the daemon.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON document, mapping 404 to `NotFound`.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let response = Self::check_status(response, what).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| DockerError::Decode(format!("{what}: {e}")))
    }

    async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DockerError::NotFound(what.to_string()));
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.message)
            .unwrap_or_else(|_| format!("docker returned status {status}"));

        Err(DockerError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl EngineApi for HttpEngine {
    fn host(&self) -> &HostAddr {
        &self.host
    }

    async fn inspect_container(&self, id: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("/containers/{id}/json"), &format!("container {id}"))
            .await
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        self.get_json("/containers/json", "containers").await
    }

    async fn top_container(&self, id: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("/containers/{id}/top"), &format!("container {id}"))
            .await
    }

    async fn events(&self, query: &EventsQuery) -> Result<EventStream> {
        let url = format!("{}/events", self.base_url);

        let filters = serde_json::json!({ "event": query.events }).to_string();
        let mut params = vec![("filters", filters)];
        if query.since > 0 {
            params.push(("since", query.since.to_string()));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        let response = Self::check_status(response, "events").await?;

        debug!(host = %self.host, since = query.since, "Opened docker event stream");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(DockerError::from));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_for(server: &MockServer) -> HttpEngine {
        let host = HostAddr::parse(&server.uri()).unwrap();
        HttpEngine::new(host, &DockerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn inspect_returns_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/abc/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Id": "abc",
                "Config": { "Labels": { "type": "user-container" } }
            })))
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        let data = engine.inspect_container("abc").await.unwrap();
        assert_eq!(data["Config"]["Labels"]["type"], "user-container");
    }

    #[tokio::test]
    async fn inspect_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/gone/json"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "message": "No such container: gone" })),
            )
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        let err = engine.inspect_container("gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn server_error_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/abc/json"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({ "message": "daemon busy" })),
            )
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        match engine.inspect_container("abc").await {
            Err(DockerError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "daemon busy");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_tops_first_container() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "Id": "first" },
                { "Id": "second" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/containers/first/top"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Titles": ["PID"],
                "Processes": [["1"]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        engine.probe().await.unwrap();
    }

    #[tokio::test]
    async fn probe_on_empty_host_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        engine.probe().await.unwrap();
    }

    #[tokio::test]
    async fn events_stream_yields_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("since", "1500"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"status\":\"start\",\"id\":\"a\",\"time\":1501}\n"),
            )
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        let query = EventsQuery::new(["start", "top"]).since(1500);
        let mut stream = engine.events(&query).await.unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend(chunk.unwrap());
        }
        let mut frames = crate::FrameBuffer::new().push(&body).unwrap();
        assert_eq!(frames.len(), 1);
        let event: serde_json::Value = serde_json::from_slice(&frames.remove(0)).unwrap();
        assert_eq!(event["status"], "start");
    }

    #[tokio::test]
    async fn events_open_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let engine = engine_for(&server);
        let result = engine.events(&EventsQuery::new(["start"])).await;
        assert!(matches!(result, Err(DockerError::Api { status: 500, .. })));
    }
}
