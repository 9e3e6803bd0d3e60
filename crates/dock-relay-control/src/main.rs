//! Dock Relay - docker event control plane
//!
//! Entry point of the relay service. Connects to the cluster manager, keeps an
//! event stream open on every host and serves the status API.

use std::sync::Arc;

use dock_relay_control::{
    create_router, task_channel, AppState, RelayConfig, RelayPublisher, RelayService,
    Task,
};
use dock_relay_docker::HttpConnector;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dock_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dock Relay");

    // Load configuration from environment
    let config = RelayConfig::from_env();
    tracing::info!(
        swarm_host = %config.swarm_host,
        env = %config.env,
        blacklist = ?config.blacklist,
        "Loaded configuration"
    );

    let connector = Arc::new(HttpConnector::new(config.swarm_host.clone(), config.docker)?);
    let (tasks, receiver) = task_channel();
    let publisher = Arc::new(RelayPublisher::new(tasks.clone(), config.publish_url.clone())?);

    let service = RelayService::new(&config, connector, publisher);

    // Background loops
    tokio::spawn(Arc::clone(service.registry()).run_supervisor());
    tokio::spawn(service.worker(tasks, receiver).run());

    let ticker = Arc::clone(service.publisher());
    let tick_interval = config.tick_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = ticker.publish_task(Task::Tick).await {
                tracing::warn!(error = %e, "Failed to publish tick");
            }
        }
    });

    service.publisher().publish_task(Task::SwarmConnect).await?;

    // Start server
    let app = create_router(AppState::from_service(&service, config.env.clone()));
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
