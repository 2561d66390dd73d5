//! Bearer-token auth middleware.
//!
//! Every inbound request passes through here before reaching a transport.
//! Excluded paths (`/health`) and a disabled `require_auth` switch forward
//! unchanged; everything else must present `Authorization: Bearer <token>`
//! matching the current api token, compared in constant time against a
//! snapshot so runtime rotations do not race.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use super::super::state::ServerState;
use crate::tokens::constant_time_eq;

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": message,
        })),
    )
        .into_response()
}

pub async fn require_bearer_auth(
    State(state): State<ServerState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if state
        .config
        .auth_exclude_paths
        .iter()
        .any(|excluded| excluded == path)
    {
        return next.run(request).await;
    }

    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_token = state.tokens.api_token();
    if api_token.is_empty() {
        debug!("Rejecting {}: no api token configured", path);
        return unauthorized("server has no configured token");
    }

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(presented) if constant_time_eq(presented, &api_token) => next.run(request).await,
        _ => {
            debug!("Rejecting {}: invalid or missing bearer token", path);
            unauthorized("invalid or missing bearer token")
        }
    }
}
