//! MCP method dispatch.
//!
//! One dispatcher backs both transports. Each JSON-RPC request is routed to
//! the registries; handler failures come back as MCP error responses or
//! error content, never as transport failures.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::context::ToolContext;
use super::protocol::{
    methods, InitializeResult, McpError, McpRequest, McpResponse, PingResult, PromptsCapability,
    PromptsGetParams, PromptsListResult, ServerCapabilities, ServerInfo, ToolsCallParams,
    ToolsCapability, ToolsListResult, MCP_PROTOCOL_VERSION,
};
use crate::registry::{PromptRegistry, ToolRegistry};

/// Server name reported in the initialize handshake.
pub const SERVER_NAME: &str = "mcp-bridge";

/// Dispatches MCP methods against the registries.
pub struct McpDispatcher {
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    context: ToolContext,
}

impl McpDispatcher {
    pub fn new(tools: Arc<ToolRegistry>, prompts: Arc<PromptRegistry>, context: ToolContext) -> Self {
        Self {
            tools,
            prompts,
            context,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    /// Parse and handle a raw JSON-RPC message.
    ///
    /// Returns `None` for notifications.
    pub async fn dispatch_text(&self, text: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                return Some(McpResponse::error(None, McpError::ParseError(e.to_string())));
            }
        };
        self.dispatch(request).await
    }

    /// Handle a single MCP request.
    ///
    /// Returns `None` for notifications.
    pub async fn dispatch(&self, request: McpRequest) -> Option<McpResponse> {
        debug!("MCP request: {}", request.method);

        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(&request),
            methods::INITIALIZED => {
                // Notification, no response needed
                return None;
            }
            methods::PING => serde_json::to_value(PingResult {})
                .map_err(|e| McpError::InternalError(e.to_string())),
            methods::TOOLS_LIST => self.handle_tools_list(),
            methods::TOOLS_CALL => self.handle_tools_call(&request).await,
            methods::PROMPTS_LIST => self.handle_prompts_list(),
            methods::PROMPTS_GET => self.handle_prompts_get(&request).await,
            methods::SHUTDOWN => {
                // Client is disconnecting gracefully
                return None;
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        if request.is_notification() {
            return None;
        }
        let request_id = request.id.clone();

        Some(match result {
            Ok(value) => McpResponse::success(request_id.unwrap(), value),
            Err(error) => McpResponse::error(request_id, error),
        })
    }

    fn handle_initialize(&self, _request: &McpRequest) -> Result<Value, McpError> {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                prompts: Some(PromptsCapability { list_changed: None }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: self.context.server_version.clone(),
            },
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, McpError> {
        let result = ToolsListResult {
            tools: self.tools.list(),
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_call(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: ToolsCallParams = decode_params(request)?;
        let arguments = params.arguments.unwrap_or_else(|| serde_json::json!({}));
        let result = self.tools.call(&self.context, &params.name, arguments).await;
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_prompts_list(&self) -> Result<Value, McpError> {
        let result = PromptsListResult {
            prompts: self.prompts.list(),
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_prompts_get(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: PromptsGetParams = decode_params(request)?;
        let arguments = params.arguments.unwrap_or_else(|| serde_json::json!({}));
        let result = self.prompts.get(&self.context, &params.name, arguments).await?;
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(request: &McpRequest) -> Result<T, McpError> {
    request
        .params
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .ok_or_else(|| McpError::InvalidParams("Missing params".to_string()))
}
