//! SSE transport, mounted at `/sse`.
//!
//! GET `/sse` opens the server→client channel and announces the companion
//! POST endpoint as the first event; POSTs to `/sse/messages/` carry
//! client→server JSON-RPC and their responses flow down the open channel.
//! This transport does not offer event-store resume.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    http::Uri,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::state::ServerState;

const KEEP_ALIVE: Duration = Duration::from_secs(120);
const CHANNEL_CAPACITY: usize = 64;

/// Open SSE sessions, keyed by the id handed out in the `endpoint` event.
pub struct SseSessionManager {
    sessions: Mutex<HashMap<String, mpsc::Sender<String>>>,
}

impl SseSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, session_id: String, tx: mpsc::Sender<String>) {
        self.sessions.lock().unwrap().insert(session_id, tx);
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Send a serialized message down a session's channel. Dead sessions are
    /// pruned on the first failed send.
    pub async fn send(&self, session_id: &str, message: String) -> Result<(), ()> {
        let tx = {
            let sessions = self.sessions.lock().unwrap();
            sessions.get(session_id).cloned()
        };
        match tx {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    debug!("SSE session {} is gone, pruning", session_id);
                    self.remove(session_id);
                    Err(())
                } else {
                    Ok(())
                }
            }
            None => Err(()),
        }
    }
}

impl Default for SseSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// GET `/sse`: open the event channel.
pub async fn sse_handler(State(state): State<ServerState>) -> Response {
    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    state.sse_sessions.register(session_id.clone(), tx);
    info!("SSE session {} opened", session_id);

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/sse/messages/?session_id={}", session_id));

    let messages = ReceiverStream::new(rx).map(|message| Event::default().data(message));
    let stream = stream::once(async move { endpoint })
        .chain(messages)
        .map(Ok::<_, Infallible>);

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SseMessageQuery {
    pub session_id: String,
}

/// POST `/sse/messages/`: client→server JSON-RPC companion endpoint.
pub async fn post_message(
    State(state): State<ServerState>,
    uri: Uri,
    body: Bytes,
) -> Response {
    let query = Query::<SseMessageQuery>::try_from_uri(&uri).ok();
    let Some(Query(query)) = query else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "bad_request", "message": "missing session_id"})),
        )
            .into_response();
    };

    let text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "bad_request", "message": "body is not UTF-8"})),
            )
                .into_response();
        }
    };

    let response = match state.dispatcher.dispatch_text(text).await {
        Some(response) => response,
        None => return StatusCode::ACCEPTED.into_response(),
    };

    let serialized = match serde_json::to_string(&response) {
        Ok(serialized) => serialized,
        Err(e) => {
            error!("Failed to serialize MCP response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.sse_sessions.send(&query.session_id, serialized).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(()) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "bad_request", "message": "unknown session id"})),
        )
            .into_response(),
    }
}
