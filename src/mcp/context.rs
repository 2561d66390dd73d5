//! MCP Tool Execution Context
//!
//! Provides access to server collaborators for tool and prompt handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::upstream::UpstreamClient;

/// Context provided to tool and prompt handlers during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Client for the host backend (also carries plugin dispatch)
    pub upstream: Arc<UpstreamClient>,

    /// Server version info
    pub server_version: String,

    /// Server start time (for uptime calculation)
    pub start_time: Instant,
}

impl ToolContext {
    pub fn new(upstream: Arc<UpstreamClient>, server_version: String, start_time: Instant) -> Self {
        Self {
            upstream,
            server_version,
            start_time,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::tokens::TokenManager;
        let upstream = Arc::new(
            UpstreamClient::new(
                "http://127.0.0.1:1".to_string(),
                1,
                TokenManager::default(),
            )
            .unwrap(),
        );
        Self::new(upstream, "test".to_string(), Instant::now())
    }
}
