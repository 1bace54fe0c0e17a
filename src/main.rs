use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use query_gateway::api::handlers::AppState;
use query_gateway::api::routes::create_router_with_state;
use query_gateway::config::Config;
use query_gateway::services::{DriverConnector, GatewaySettings, QueryGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting server on {}", config.server_address());

    let settings = GatewaySettings::from(&config.gateway);
    info!(
        "Preview limit {} rows, close timeout {:?}",
        settings.preview_limit, settings.close_timeout
    );
    let gateway = QueryGateway::new(Arc::new(DriverConnector), settings);
    let state = AppState::new(gateway, config.gateway.event_buffer);

    let app = create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse().map_err(|e| {
        error!("Invalid server address {}: {}", config.server_address(), e);
        e
    })?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
