use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::gateway;
use crate::api::handlers::AppState;

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/login", post(gateway::login))
        .route("/api/status", get(gateway::status))
        .route("/api/databases", post(gateway::show_databases))
        .route("/api/tables", post(gateway::show_tables))
        .route("/api/query", post(gateway::send_query))
        .route("/api/server-query", post(gateway::server_query))
        .route("/api/disconnect", post(gateway::disconnect))
        .route("/api/events", get(gateway::events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
