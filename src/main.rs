use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_bridge::event_store::{
    spawn_cleanup_task, EventStore, EventStoreSettings, InMemoryEventStore, SharedEventStore,
    SqliteEventStore,
};
use mcp_bridge::mcp::{McpDispatcher, ToolContext};
use mcp_bridge::registry::{
    register_builtin_prompts, register_builtin_tools, PromptRegistry, ToolRegistry,
};
use mcp_bridge::server::sse::SseSessionManager;
use mcp_bridge::server::state::ServerState;
use mcp_bridge::server::streamable::StreamSessionManager;
use mcp_bridge::server::{run_server, RequestsLoggingLevel, ServerConfig};
use mcp_bridge::tokens::TokenManager;
use mcp_bridge::upstream::{UpstreamClient, UPSTREAM_TIMEOUT_SECS};
use mcp_bridge::watcher::{
    spawn_prompt_watcher, spawn_tool_watcher, PLUGIN_PROMPTS_FILE, PLUGIN_TOOLS_FILE,
    POLL_INTERVAL,
};
use tokio_util::sync::CancellationToken;

/// File name of the event database, in the working directory.
const EVENTS_DB_FILE: &str = "events.db";

#[derive(Parser, Debug)]
struct CliArgs {
    /// Bind address.
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Listen port.
    #[clap(long, default_value_t = 3111)]
    pub port: u16,

    /// Root log level (TRACE, DEBUG, INFO, WARN, ERROR).
    #[clap(long, default_value = "INFO")]
    pub log_level: String,

    /// Optional log file sink, in addition to stderr.
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Streamable-HTTP responds with a single JSON payload instead of a stream.
    #[clap(long)]
    pub json_response: bool,

    /// Initial API bearer token gating inbound requests.
    #[clap(long, default_value = "")]
    pub auth_token: String,

    /// Bearer token attached to calls to the host backend.
    #[clap(long, default_value = "")]
    pub access_token: String,

    /// Enable the bearer check on inbound requests.
    #[clap(long)]
    pub require_auth: bool,

    /// Disable the bearer check on inbound requests.
    #[clap(long, conflicts_with = "require_auth")]
    pub no_auth: bool,

    /// Port of the host backend on localhost.
    #[clap(long, default_value_t = 3001)]
    pub moviepilot_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub requests_logging: RequestsLoggingLevel,
}

fn init_logging(cli_args: &CliArgs) -> Result<()> {
    let level: LevelFilter = cli_args
        .log_level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", cli_args.log_level))?;

    let file_layer = match &cli_args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    init_logging(&cli_args)?;

    let start_time = Instant::now();
    let server_version = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    let tokens = TokenManager::new(cli_args.auth_token.clone(), cli_args.access_token.clone());

    let base_url = format!("http://localhost:{}", cli_args.moviepilot_port);
    info!("Upstream backend at {}", base_url);
    let upstream = Arc::new(
        UpstreamClient::new(base_url, UPSTREAM_TIMEOUT_SECS, tokens.clone())
            .context("Failed to build upstream HTTP client")?,
    );

    // Event store, with in-memory degradation if the disk store fails.
    let store_settings = EventStoreSettings::default();
    let store: Arc<dyn EventStore> =
        match SqliteEventStore::new(EVENTS_DB_FILE, store_settings.clone()) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(
                    "Failed to open event store at {} ({}), resumability disabled",
                    EVENTS_DB_FILE, e
                );
                Arc::new(InMemoryEventStore::new(store_settings.max_events_per_stream))
            }
        };
    let event_store = SharedEventStore::new(store);

    // Registries: built-ins at boot, plugin contributions via the watchers.
    let tools = Arc::new(ToolRegistry::new());
    let prompts = Arc::new(PromptRegistry::new());
    register_builtin_tools(&tools);
    register_builtin_prompts(&prompts);

    let context = ToolContext::new(upstream, server_version, start_time);
    let dispatcher = Arc::new(McpDispatcher::new(tools.clone(), prompts.clone(), context));

    let tool_watcher = spawn_tool_watcher(PathBuf::from(PLUGIN_TOOLS_FILE), tools, POLL_INTERVAL);
    let prompt_watcher =
        spawn_prompt_watcher(PathBuf::from(PLUGIN_PROMPTS_FILE), prompts, POLL_INTERVAL);

    let cleanup_token = CancellationToken::new();
    let cleanup_task = spawn_cleanup_task(
        event_store.clone(),
        Duration::from_secs(store_settings.auto_cleanup_interval_hours * 3600),
        cleanup_token.clone(),
    );

    let config = ServerConfig {
        host: cli_args.host,
        port: cli_args.port,
        json_response: cli_args.json_response,
        require_auth: cli_args.require_auth && !cli_args.no_auth,
        requests_logging_level: cli_args.requests_logging,
        ..Default::default()
    };

    let state = ServerState {
        config,
        start_time,
        tokens,
        dispatcher,
        event_store,
        stream_sessions: Arc::new(StreamSessionManager::new()),
        sse_sessions: Arc::new(SseSessionManager::new()),
    };

    let result = run_server(state).await;

    // Lifespan teardown: cancel cleanup, stop the watchers.
    cleanup_token.cancel();
    let _ = cleanup_task.await;
    tool_watcher.stop();
    prompt_watcher.stop();

    info!("Shutdown complete");
    result
}
