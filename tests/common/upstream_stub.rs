//! Fake host backend.
//!
//! Stands in for the media-automation application: answers the plugin
//! execute endpoints and a couple of API routes, and records every request
//! body so tests can assert on the exact dispatch payloads.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

#[derive(Clone)]
struct StubState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
}

pub struct UpstreamStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

async fn tool_execute(
    State(state): State<StubState>,
    Path(plugin_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.requests.lock().unwrap().push(RecordedRequest {
        path: format!("/api/v1/plugin/{}/mcp_tool_execute", plugin_id),
        body: body.clone(),
    });
    Json(json!({
        "success": true,
        "message": "ok",
        "data": {"echo": body},
    }))
}

async fn prompt_execute(
    State(state): State<StubState>,
    Path(plugin_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.requests.lock().unwrap().push(RecordedRequest {
        path: format!("/api/v1/plugin/{}/mcp_prompt_execute", plugin_id),
        body: body.clone(),
    });
    Json(json!({
        "success": true,
        "message": "ok",
        "data": {
            "description": "stub prompt",
            "messages": [{"role": "user", "content": "from the stub"}]
        },
    }))
}

async fn search() -> Json<Value> {
    Json(json!([{"title": "Dune", "year": 2021}]))
}

impl UpstreamStub {
    pub async fn spawn() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            requests: requests.clone(),
        };

        let app = Router::new()
            .route(
                "/api/v1/plugin/{plugin_id}/mcp_tool_execute",
                post(tool_execute),
            )
            .route(
                "/api/v1/plugin/{plugin_id}/mcp_prompt_execute",
                post(prompt_execute),
            )
            .route("/api/v1/search", get(search))
            .route("/", get(|| async { "ok" }))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub backend");
        let addr: SocketAddr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Stub backend failed");
        });

        Self {
            base_url,
            requests,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}
