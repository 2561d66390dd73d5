use anyhow::{Context, Result};
use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::info;

use super::http_layers::{log_requests, require_bearer_auth};
use super::sse;
use super::state::ServerState;
use super::streamable;

async fn health(State(_state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "server": "mcp-http",
    }))
}

/// Build the full application router: both transports, the unauthenticated
/// health probe, auth gate, and request logging.
pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/mcp",
            post(streamable::post_mcp)
                .get(streamable::get_mcp)
                .delete(streamable::delete_mcp),
        )
        .route("/sse", get(sse::sse_handler))
        .route("/sse/messages/", post(sse::post_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_auth,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, draining transports");
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = make_app(state);

    // tokio's TcpListener::bind sets SO_REUSEADDR on the socket.
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Serving MCP bridge at http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
