//! MCP Bridge Server Library
//!
//! Exposes the host media-automation backend's capabilities, plus
//! capabilities contributed dynamically by sibling plugins, to external MCP
//! clients over Streamable-HTTP and SSE. This library form exists for the
//! e2e tests and potential reuse.

pub mod event_store;
pub mod mcp;
pub mod registry;
pub mod safe_io;
pub mod server;
pub mod tokens;
pub mod upstream;
pub mod watcher;

// Re-export commonly used types for convenience
pub use event_store::{
    EventStore, EventStoreSettings, InMemoryEventStore, SharedEventStore, SqliteEventStore,
};
pub use mcp::{McpDispatcher, ToolContext};
pub use registry::{PromptRegistry, ToolRegistry};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use tokens::TokenManager;
pub use upstream::UpstreamClient;
