//! MCP (Model Context Protocol) Session Layer
//!
//! Implements the MCP server methods over the tool and prompt registries.
//! Transport-agnostic: the Streamable-HTTP and SSE transports both feed
//! JSON-RPC messages through [`session::McpDispatcher`].

pub mod context;
pub mod protocol;
pub mod session;

pub use context::ToolContext;
pub use protocol::{McpError, McpRequest, McpResponse};
pub use session::McpDispatcher;
