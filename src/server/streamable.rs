//! Streamable-HTTP transport, mounted at `/mcp`.
//!
//! Each client session is one logical stream in the event store. Every
//! server→client message is assigned an event id by the store *before*
//! emission, and the SSE `id:` field carries it, so a client reconnecting
//! with `Last-Event-ID` gets everything it missed replayed before live
//! traffic resumes.
//!
//! In `--json-response` mode the POST answers with a plain JSON body instead
//! of a stream; events are still stored so resume semantics stay uniform.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::ServerState;

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Keep-alive ping period on open streams.
const KEEP_ALIVE: Duration = Duration::from_secs(120);

/// Buffered live channel per open GET stream.
const LIVE_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Session bookkeeping
// ============================================================================

struct StreamSession {
    live_tx: Option<mpsc::Sender<Event>>,
}

/// Tracks the Streamable-HTTP sessions and their live GET channels.
pub struct StreamSessionManager {
    sessions: Mutex<HashMap<String, StreamSession>>,
}

impl StreamSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh stream id.
    pub fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), StreamSession { live_tx: None });
        debug!("Created MCP session {}", id);
        id
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn attach_live(&self, session_id: &str, tx: mpsc::Sender<Event>) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.live_tx = Some(tx);
        }
    }

    /// Push one event onto the session's live channel, if any is open.
    pub async fn send_live(&self, session_id: &str, event: Event) -> bool {
        let tx = {
            let sessions = self.sessions.lock().unwrap();
            sessions
                .get(session_id)
                .and_then(|session| session.live_tx.clone())
        };
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

impl Default for StreamSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn session_header(session_id: &str) -> (HeaderName, String) {
    (
        HeaderName::from_static(MCP_SESSION_ID_HEADER),
        session_id.to_string(),
    )
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// POST `/mcp`: one JSON-RPC message in, one response out.
///
/// The response message is stored before emission and flows back either as a
/// single-event SSE stream (default) or a JSON body (`--json-response`).
pub async fn post_mcp(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
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

    let session_id = match header_value(&headers, MCP_SESSION_ID_HEADER) {
        Some(id) => {
            if !state.stream_sessions.exists(id) {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": "bad_request", "message": "unknown session id"})),
                )
                    .into_response();
            }
            id.to_string()
        }
        None => state.stream_sessions.create_session(),
    };

    let response = match state.dispatcher.dispatch_text(text).await {
        Some(response) => response,
        None => {
            // Notification: nothing to send back.
            return (StatusCode::ACCEPTED, [session_header(&session_id)]).into_response();
        }
    };

    let serialized = match serde_json::to_string(&response) {
        Ok(serialized) => serialized,
        Err(e) => {
            error!("Failed to serialize MCP response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Store before emission so the client can resume from this message.
    let event_id = match state
        .event_store
        .store_event(session_id.clone(), serialized.clone())
        .await
    {
        Ok(event_id) => Some(event_id),
        Err(e) => {
            error!("Failed to store event for stream {}: {}", session_id, e);
            None
        }
    };

    if state.config.json_response {
        let mut response = (
            StatusCode::OK,
            [
                session_header(&session_id),
                (
                    HeaderName::from_static("content-type"),
                    "application/json".to_string(),
                ),
            ],
            serialized,
        )
            .into_response();
        if let Some(event_id) = event_id {
            if let Ok(value) = event_id.parse() {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("mcp-event-id"), value);
            }
        }
        return response;
    }

    let mut event = Event::default().data(serialized);
    if let Some(event_id) = event_id {
        event = event.id(event_id);
    }
    let stream = stream::once(async move { Ok::<_, Infallible>(event) });
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE));

    let mut response = sse.into_response();
    if let Ok(value) = session_id.parse() {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
    }
    response
}

/// GET `/mcp`: open the session's server→client channel.
///
/// With `Last-Event-ID`, all events stored for the stream after that id are
/// replayed first; live emission resumes afterwards.
pub async fn get_mcp(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let session_id = match header_value(&headers, MCP_SESSION_ID_HEADER) {
        Some(id) => id.to_string(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "bad_request", "message": "missing Mcp-Session-Id header"})),
            )
                .into_response();
        }
    };
    if !state.stream_sessions.exists(&session_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "bad_request", "message": "unknown session id"})),
        )
            .into_response();
    }

    let last_event_id = header_value(&headers, LAST_EVENT_ID_HEADER).map(str::to_string);

    let (tx, rx) = mpsc::channel::<Event>(LIVE_CHANNEL_CAPACITY);

    // Replay feeds the channel first, then the live sender is attached, so a
    // resuming client sees its backlog in order before fresh messages.
    let replay_state = state.clone();
    let replay_session = session_id.clone();
    tokio::spawn(async move {
        if let Some(last_event_id) = last_event_id {
            match replay_state
                .event_store
                .replay_events_after(last_event_id.clone())
                .await
            {
                Ok(Some((stream_id, events))) => {
                    if stream_id != replay_session {
                        warn!(
                            "Last event id {} belongs to stream {}, not session {}",
                            last_event_id, stream_id, replay_session
                        );
                    }
                    info!(
                        "Replaying {} events for session {}",
                        events.len(),
                        replay_session
                    );
                    for stored in events {
                        let event = Event::default().id(stored.event_id).data(stored.message);
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    debug!("No replay available after event id {}", last_event_id);
                }
                Err(e) => {
                    error!("Replay failed for session {}: {}", replay_session, e);
                }
            }
        }
        replay_state
            .stream_sessions
            .attach_live(&replay_session, tx);
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
        .into_response()
}

/// DELETE `/mcp`: explicitly terminate a session.
pub async fn delete_mcp(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let session_id = match header_value(&headers, MCP_SESSION_ID_HEADER) {
        Some(id) => id.to_string(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "bad_request", "message": "missing Mcp-Session-Id header"})),
            )
                .into_response();
        }
    };
    if state.stream_sessions.remove(&session_id) {
        info!("Terminated MCP session {}", session_id);
        StatusCode::OK.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let manager = StreamSessionManager::new();
        let id = manager.create_session();
        assert!(manager.exists(&id));
        assert_eq!(manager.session_count(), 1);
        assert!(manager.remove(&id));
        assert!(!manager.exists(&id));
        assert!(!manager.remove(&id));
    }

    #[tokio::test]
    async fn test_send_live_without_channel() {
        let manager = StreamSessionManager::new();
        let id = manager.create_session();
        assert!(!manager.send_live(&id, Event::default().data("x")).await);
    }

    #[tokio::test]
    async fn test_send_live_with_channel() {
        let manager = StreamSessionManager::new();
        let id = manager.create_session();
        let (tx, mut rx) = mpsc::channel(4);
        manager.attach_live(&id, tx);
        assert!(manager.send_live(&id, Event::default().data("x")).await);
        assert!(rx.recv().await.is_some());
    }
}
