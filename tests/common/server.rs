//! Test server lifecycle management
//!
//! Spawns an isolated bridge server on a random port for each test, with its
//! own event database and rendezvous directory. The server shuts down
//! gracefully when the instance is dropped.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::net::TcpListener;

use mcp_bridge::event_store::{EventStoreSettings, SharedEventStore, SqliteEventStore};
use mcp_bridge::mcp::{McpDispatcher, ToolContext};
use mcp_bridge::registry::{
    register_builtin_prompts, register_builtin_tools, PromptRegistry, ToolRegistry,
};
use mcp_bridge::server::sse::SseSessionManager;
use mcp_bridge::server::state::ServerState;
use mcp_bridge::server::streamable::StreamSessionManager;
use mcp_bridge::server::{make_app, RequestsLoggingLevel, ServerConfig};
use mcp_bridge::tokens::TokenManager;
use mcp_bridge::upstream::UpstreamClient;
use mcp_bridge::watcher::{
    spawn_prompt_watcher, spawn_tool_watcher, WatcherHandle, PLUGIN_PROMPTS_FILE,
    PLUGIN_TOOLS_FILE,
};

use super::{SERVER_READY_POLL_INTERVAL_MS, SERVER_READY_TIMEOUT_MS, TEST_WATCHER_POLL_MS};

pub struct SpawnOptions {
    pub require_auth: bool,
    pub api_token: String,
    pub upstream_token: String,
    pub json_response: bool,
    /// Base URL of the backend; defaults to an unreachable address.
    pub upstream_url: Option<String>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            require_auth: false,
            api_token: String::new(),
            upstream_token: String::new(),
            json_response: false,
            upstream_url: None,
        }
    }
}

/// Test server instance with isolated state.
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct handles for assertions
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub tokens: TokenManager,
    pub event_store: SharedEventStore,
    pub stream_sessions: Arc<StreamSessionManager>,

    /// Directory holding the rendezvous files watched by this instance
    pub rendezvous_dir: TempDir,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _watchers: Vec<WatcherHandle>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn(options: SpawnOptions) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");
        let rendezvous_dir = TempDir::new().expect("Failed to create rendezvous dir");

        let event_store = SharedEventStore::new(Arc::new(
            SqliteEventStore::new(
                temp_db_dir.path().join("events.db"),
                EventStoreSettings::default(),
            )
            .expect("Failed to open event store"),
        ));

        let tokens = TokenManager::new(options.api_token.clone(), options.upstream_token.clone());
        let upstream_url = options
            .upstream_url
            .unwrap_or_else(|| "http://127.0.0.1:1".to_string());
        let upstream = Arc::new(
            UpstreamClient::new(upstream_url, 5, tokens.clone())
                .expect("Failed to build upstream client"),
        );

        let tools = Arc::new(ToolRegistry::new());
        let prompts = Arc::new(PromptRegistry::new());
        register_builtin_tools(&tools);
        register_builtin_prompts(&prompts);

        let context = ToolContext::new(upstream, "test".to_string(), Instant::now());
        let dispatcher = Arc::new(McpDispatcher::new(tools.clone(), prompts.clone(), context));

        let poll = Duration::from_millis(TEST_WATCHER_POLL_MS);
        let watchers = vec![
            spawn_tool_watcher(
                rendezvous_dir.path().join(PLUGIN_TOOLS_FILE),
                tools.clone(),
                poll,
            ),
            spawn_prompt_watcher(
                rendezvous_dir.path().join(PLUGIN_PROMPTS_FILE),
                prompts.clone(),
                poll,
            ),
        ];

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr: SocketAddr = listener.local_addr().expect("Failed to get local address");
        let port = addr.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            json_response: options.json_response,
            require_auth: options.require_auth,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };

        let stream_sessions = Arc::new(StreamSessionManager::new());
        let state = ServerState {
            config,
            start_time: Instant::now(),
            tokens: tokens.clone(),
            dispatcher,
            event_store: event_store.clone(),
            stream_sessions: stream_sessions.clone(),
            sse_sessions: Arc::new(SseSessionManager::new()),
        };

        let app = make_app(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            tools,
            prompts,
            tokens,
            event_store,
            stream_sessions,
            rendezvous_dir,
            _temp_db_dir: temp_db_dir,
            _watchers: watchers,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Path of this instance's `plugin_tools.json`.
    pub fn plugin_tools_path(&self) -> PathBuf {
        self.rendezvous_dir.path().join(PLUGIN_TOOLS_FILE)
    }

    /// Path of this instance's `plugin_prompts.json`.
    pub fn plugin_prompts_path(&self) -> PathBuf {
        self.rendezvous_dir.path().join(PLUGIN_PROMPTS_FILE)
    }

    /// Waits for the server to become ready by polling /health
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(250))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client
                .get(format!("{}/health", self.base_url))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDirs and watcher handles clean up automatically
    }
}
