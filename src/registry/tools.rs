//! Tool registry and dispatch.
//!
//! Two sub-collections share one flat namespace: built-in tools registered at
//! boot, and plugin-contributed tools reconciled at runtime by the rendezvous
//! watcher. Readers always operate on an immutable snapshot; reconciliation
//! swaps the snapshot atomically so dispatch never observes a partial state.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::validation::{validate_arguments, ParameterSchema};
use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{ToolDefinition, ToolsCallResult};

// ============================================================================
// Tool Types
// ============================================================================

/// Raw handler output, normalized before it reaches the client.
pub type ToolResult = Result<Value, anyhow::Error>;

/// Boxed future for async tool execution
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Built-in tool handler function type
pub type BuiltinHandler = Arc<dyn Fn(ToolContext, Value) -> ToolFuture + Send + Sync>;

/// Where a tool's implementation lives.
pub enum ToolHandler {
    /// Runs in-process; may call the upstream client.
    Builtin(BuiltinHandler),
    /// Reached by POSTing `{tool_name, arguments}` to the plugin's endpoint.
    Plugin { plugin_id: String, endpoint: String },
}

/// A registered tool with metadata and handler
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub schema: ParameterSchema,
    pub handler: ToolHandler,
    pub validate: bool,
}

impl RegisteredTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.schema.to_input_schema(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct ToolSnapshot {
    builtin: BTreeMap<String, Arc<RegisteredTool>>,
    plugin_sets: BTreeMap<String, Vec<Arc<RegisteredTool>>>,
    /// Flat namespace: plugin entries shadow built-ins, later plugins shadow
    /// earlier ones.
    merged: BTreeMap<String, Arc<RegisteredTool>>,
}

impl ToolSnapshot {
    fn rebuild_merged(&mut self) {
        let mut merged = self.builtin.clone();
        for (plugin_id, tools) in &self.plugin_sets {
            for tool in tools {
                if let Some(previous) = merged.get(&tool.name) {
                    let previous_owner = match &previous.handler {
                        ToolHandler::Builtin(_) => "builtin".to_string(),
                        ToolHandler::Plugin { plugin_id, .. } => format!("plugin {}", plugin_id),
                    };
                    warn!(
                        "Tool '{}' from plugin {} shadows the {} registration",
                        tool.name, plugin_id, previous_owner
                    );
                }
                merged.insert(tool.name.clone(), tool.clone());
            }
        }
        self.merged = merged;
    }
}

/// Registry for MCP tools.
pub struct ToolRegistry {
    snapshot: RwLock<Arc<ToolSnapshot>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(ToolSnapshot::default())),
        }
    }

    fn load(&self) -> Arc<ToolSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    fn swap(&self, mutate: impl FnOnce(&mut ToolSnapshot)) {
        let mut guard = self.snapshot.write().unwrap();
        let mut next = ToolSnapshot {
            builtin: guard.builtin.clone(),
            plugin_sets: guard.plugin_sets.clone(),
            merged: BTreeMap::new(),
        };
        mutate(&mut next);
        next.rebuild_merged();
        *guard = Arc::new(next);
    }

    /// Register a built-in tool (boot time).
    pub fn register_builtin(&self, tool: RegisteredTool) {
        self.swap(|snapshot| {
            snapshot.builtin.insert(tool.name.clone(), Arc::new(tool));
        });
    }

    /// Replace the entire plugin-contributed collection in one atomic swap.
    ///
    /// Plugins absent from `sets` are unregistered; plugins present have
    /// their previous entries dropped and the new set registered
    /// (last-writer-wins per plugin).
    pub fn apply_plugin_tools(&self, sets: BTreeMap<String, Vec<RegisteredTool>>) {
        self.swap(|snapshot| {
            snapshot.plugin_sets = sets
                .into_iter()
                .map(|(plugin_id, tools)| {
                    (plugin_id, tools.into_iter().map(Arc::new).collect())
                })
                .collect();
        });
    }

    /// Plugin ids currently contributing tools.
    pub fn plugin_ids(&self) -> Vec<String> {
        self.load().plugin_sets.keys().cloned().collect()
    }

    /// Merged catalog for `tools/list`.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.load()
            .merged
            .values()
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.load().merged.len()
    }

    /// Resolve, validate, invoke, and normalize one tool call.
    ///
    /// Never propagates an error to the transport: unknown tools, validation
    /// failures, and handler errors all come back as content blocks.
    pub async fn call(&self, ctx: &ToolContext, name: &str, arguments: Value) -> ToolsCallResult {
        let snapshot = self.load();
        let tool = match snapshot.merged.get(name) {
            Some(tool) => tool.clone(),
            None => {
                debug!("Call for unknown tool '{}'", name);
                return ToolsCallResult::text(format!("Unknown tool: {}", name));
            }
        };
        drop(snapshot);

        if tool.validate {
            if let Err(reason) = validate_arguments(&tool.schema, &arguments) {
                debug!("Tool '{}' argument validation failed: {}", name, reason);
                return render_payload(json!({
                    "success": false,
                    "message": "parameter validation failed",
                    "data": null,
                }));
            }
        }

        let outcome = match &tool.handler {
            ToolHandler::Builtin(handler) => handler(ctx.clone(), arguments).await,
            ToolHandler::Plugin { endpoint, .. } => ctx
                .upstream
                .execute_plugin_tool(endpoint, name, &arguments)
                .await
                .map_err(anyhow::Error::from),
        };

        match outcome {
            Ok(value) => render_payload(normalize_payload(value)),
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                render_payload(json!({
                    "success": false,
                    "message": e.to_string(),
                    "data": null,
                }))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handlers returning the `{success, message, data}` envelope pass through
/// unchanged; anything else is wrapped as a success.
fn normalize_payload(value: Value) -> Value {
    let is_envelope = value
        .as_object()
        .map(|obj| obj.contains_key("success") && obj.contains_key("message") && obj.contains_key("data"))
        .unwrap_or(false);
    if is_envelope {
        value
    } else {
        json!({
            "success": true,
            "message": "ok",
            "data": value,
        })
    }
}

fn render_payload(payload: Value) -> ToolsCallResult {
    let failed = payload.get("success") == Some(&Value::Bool(false));
    let mut result =
        ToolsCallResult::json(&payload).unwrap_or_else(|e| ToolsCallResult::error(e.to_string()));
    if failed {
        result.is_error = Some(true);
    }
    result
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for registering a built-in tool
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: ParameterSchema,
    validate: bool,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            schema: ParameterSchema::empty(),
            validate: true,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn schema(mut self, schema: ParameterSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredTool
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        RegisteredTool {
            name: self.name,
            description: self.description,
            schema: self.schema,
            validate: self.validate,
            handler: ToolHandler::Builtin(Arc::new(move |ctx, params| {
                Box::pin(handler(ctx, params))
            })),
        }
    }
}
