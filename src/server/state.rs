use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use super::sse::SseSessionManager;
use super::streamable::StreamSessionManager;
use super::ServerConfig;
use crate::event_store::SharedEventStore;
use crate::mcp::McpDispatcher;
use crate::tokens::TokenManager;

pub type GuardedDispatcher = Arc<McpDispatcher>;
pub type GuardedStreamSessions = Arc<StreamSessionManager>;
pub type GuardedSseSessions = Arc<SseSessionManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub tokens: TokenManager,
    pub dispatcher: GuardedDispatcher,
    pub event_store: SharedEventStore,
    pub stream_sessions: GuardedStreamSessions,
    pub sse_sessions: GuardedSseSessions,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedDispatcher {
    fn from_ref(input: &ServerState) -> Self {
        input.dispatcher.clone()
    }
}

impl FromRef<ServerState> for SharedEventStore {
    fn from_ref(input: &ServerState) -> Self {
        input.event_store.clone()
    }
}

impl FromRef<ServerState> for GuardedStreamSessions {
    fn from_ref(input: &ServerState) -> Self {
        input.stream_sessions.clone()
    }
}

impl FromRef<ServerState> for GuardedSseSessions {
    fn from_ref(input: &ServerState) -> Self {
        input.sse_sessions.clone()
    }
}

impl FromRef<ServerState> for TokenManager {
    fn from_ref(input: &ServerState) -> Self {
        input.tokens.clone()
    }
}
