//! Relay configuration.
//!
//! Defaults first; each environment variable optionally overrides its field.
//! Values that fail to parse keep the default.

use std::time::Duration;

use dock_relay_core::HostAddr;
use dock_relay_docker::DockerConfig;
use tracing::warn;

/// Configuration for the relay service.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// HTTP listen address (e.g., "0.0.0.0:3000").
    pub listen_addr: String,

    /// Address of the cluster manager.
    pub swarm_host: HostAddr,

    /// How long a fresh event stream may stay silent before it is considered dead.
    pub liveness_timeout: Duration,

    /// Image name substrings whose events are dropped.
    pub blacklist: Vec<String>,

    /// Attempts per container inspection before the failure is classified.
    pub inspect_retries: u32,

    /// Deliveries per task before a retryable failure is given up on.
    pub max_task_attempts: u32,

    /// Base delay of the exponential task redelivery backoff.
    pub task_retry_base: Duration,

    /// Maximum tasks executing at once.
    pub worker_concurrency: usize,

    /// Period of the `time.five-minutes.passed` tick.
    pub tick_interval: Duration,

    /// Base URL notifications are POSTed to. When unset, notifications are only logged.
    pub publish_url: Option<String>,

    /// Deployment environment reported by `/status`.
    pub env: String,

    /// Docker HTTP adapter settings.
    pub docker: DockerConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            swarm_host: HostAddr::new("127.0.0.1", 2375),
            liveness_timeout: Duration::from_millis(5000),
            blacklist: Vec::new(),
            inspect_retries: 3,
            max_task_attempts: 5,
            task_retry_base: Duration::from_millis(500),
            worker_concurrency: 32,
            tick_interval: Duration::from_secs(300),
            publish_url: None,
            env: "development".to_string(),
            docker: DockerConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Some(val) = lookup("SWARM_HOST") {
            match HostAddr::parse(&val) {
                Ok(host) => config.swarm_host = host,
                Err(e) => warn!(value = %val, error = %e, "Ignoring invalid SWARM_HOST"),
            }
        }
        if let Some(val) = lookup("EVENT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                config.liveness_timeout = Duration::from_millis(n);
            }
        }
        if let Some(val) = lookup("CONTAINERS_BLACKLIST") {
            config.blacklist = parse_blacklist(&val);
        }
        if let Some(val) = lookup("DOCKER_INSPECT_RETRIES") {
            if let Ok(n) = val.parse() {
                config.inspect_retries = n;
            }
        }
        if let Some(val) = lookup("TASK_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.max_task_attempts = n;
            }
        }
        if let Some(val) = lookup("TASK_RETRY_BASE_MS") {
            if let Ok(n) = val.parse() {
                config.task_retry_base = Duration::from_millis(n);
            }
        }
        if let Some(val) = lookup("WORKER_CONCURRENCY") {
            if let Ok(n) = val.parse::<usize>() {
                config.worker_concurrency = n.max(1);
            }
        }
        if let Some(val) = lookup("TICK_INTERVAL_SECONDS") {
            if let Ok(n) = val.parse::<u64>() {
                config.tick_interval = Duration::from_secs(n.max(1));
            }
        }
        if let Some(val) = lookup("PUBLISH_URL") {
            let val = val.trim().trim_end_matches('/');
            if !val.is_empty() {
                config.publish_url = Some(val.to_string());
            }
        }
        if let Some(val) = lookup("NODE_ENV") {
            config.env = val;
        }

        config
    }
}

/// Split a comma-separated blacklist, dropping empty entries.
#[must_use]
pub fn parse_blacklist(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
