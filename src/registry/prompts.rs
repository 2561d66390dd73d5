//! Prompt registry and rendering.
//!
//! Same shape as the tool registry: built-in prompts registered at boot,
//! plugin prompts reconciled at runtime, readers on an atomically swapped
//! snapshot. A prompt's handler renders a description plus an ordered list
//! of role/text messages.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{
    McpError, PromptArgumentDefinition, PromptDefinition, PromptMessage, PromptsGetResult,
};

// ============================================================================
// Prompt Types
// ============================================================================

pub type PromptResult = Result<PromptsGetResult, McpError>;

/// Boxed future for async prompt rendering
pub type PromptFuture = Pin<Box<dyn Future<Output = PromptResult> + Send>>;

/// Built-in prompt handler function type
pub type BuiltinPromptHandler = Arc<dyn Fn(ToolContext, Value) -> PromptFuture + Send + Sync>;

/// Where a prompt's implementation lives.
pub enum PromptHandler {
    Builtin(BuiltinPromptHandler),
    Plugin { plugin_id: String, endpoint: String },
}

/// Argument declared by a prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptArgSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl PromptArgSpec {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }
}

/// A registered prompt with metadata and handler
pub struct RegisteredPrompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgSpec>,
    pub handler: PromptHandler,
}

impl RegisteredPrompt {
    fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self
                .arguments
                .iter()
                .map(|arg| PromptArgumentDefinition {
                    name: arg.name.clone(),
                    description: if arg.description.is_empty() {
                        None
                    } else {
                        Some(arg.description.clone())
                    },
                    required: arg.required,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct PromptSnapshot {
    builtin: BTreeMap<String, Arc<RegisteredPrompt>>,
    plugin_sets: BTreeMap<String, Vec<Arc<RegisteredPrompt>>>,
    merged: BTreeMap<String, Arc<RegisteredPrompt>>,
}

impl PromptSnapshot {
    fn rebuild_merged(&mut self) {
        let mut merged = self.builtin.clone();
        for (plugin_id, prompts) in &self.plugin_sets {
            for prompt in prompts {
                if merged.contains_key(&prompt.name) {
                    warn!(
                        "Prompt '{}' from plugin {} shadows an earlier registration",
                        prompt.name, plugin_id
                    );
                }
                merged.insert(prompt.name.clone(), prompt.clone());
            }
        }
        self.merged = merged;
    }
}

/// Registry for MCP prompts.
pub struct PromptRegistry {
    snapshot: RwLock<Arc<PromptSnapshot>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(PromptSnapshot::default())),
        }
    }

    fn load(&self) -> Arc<PromptSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    fn swap(&self, mutate: impl FnOnce(&mut PromptSnapshot)) {
        let mut guard = self.snapshot.write().unwrap();
        let mut next = PromptSnapshot {
            builtin: guard.builtin.clone(),
            plugin_sets: guard.plugin_sets.clone(),
            merged: BTreeMap::new(),
        };
        mutate(&mut next);
        next.rebuild_merged();
        *guard = Arc::new(next);
    }

    /// Register a built-in prompt (boot time).
    pub fn register_builtin(&self, prompt: RegisteredPrompt) {
        self.swap(|snapshot| {
            snapshot
                .builtin
                .insert(prompt.name.clone(), Arc::new(prompt));
        });
    }

    /// Replace the entire plugin-contributed collection in one atomic swap.
    pub fn apply_plugin_prompts(&self, sets: BTreeMap<String, Vec<RegisteredPrompt>>) {
        self.swap(|snapshot| {
            snapshot.plugin_sets = sets
                .into_iter()
                .map(|(plugin_id, prompts)| {
                    (plugin_id, prompts.into_iter().map(Arc::new).collect())
                })
                .collect();
        });
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.load().plugin_sets.keys().cloned().collect()
    }

    /// Merged catalog for `prompts/list`.
    pub fn list(&self) -> Vec<PromptDefinition> {
        self.load()
            .merged
            .values()
            .map(|prompt| prompt.definition())
            .collect()
    }

    pub fn prompt_count(&self) -> usize {
        self.load().merged.len()
    }

    /// Render one prompt. Unknown names and bad arguments come back as MCP
    /// errors for the session layer to wrap, never as transport failures.
    pub async fn get(&self, ctx: &ToolContext, name: &str, arguments: Value) -> PromptResult {
        let snapshot = self.load();
        let prompt = match snapshot.merged.get(name) {
            Some(prompt) => prompt.clone(),
            None => {
                debug!("Request for unknown prompt '{}'", name);
                return Err(McpError::PromptNotFound(name.to_string()));
            }
        };
        drop(snapshot);

        let empty = serde_json::Map::new();
        let args = arguments.as_object().unwrap_or(&empty);
        for spec in &prompt.arguments {
            if spec.required && !args.contains_key(&spec.name) {
                return Err(McpError::InvalidParams(format!(
                    "missing required argument '{}'",
                    spec.name
                )));
            }
        }

        match &prompt.handler {
            PromptHandler::Builtin(handler) => handler(ctx.clone(), arguments).await,
            PromptHandler::Plugin { endpoint, .. } => {
                let payload = ctx
                    .upstream
                    .execute_plugin_prompt(endpoint, name, &arguments)
                    .await
                    .map_err(|e| McpError::InternalError(e.to_string()))?;
                parse_plugin_prompt_payload(&prompt.description, payload)
            }
        }
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a plugin's `{success, data, message}` response onto a prompt result.
///
/// `data` may be `{description?, messages: [...]}` or a bare message list;
/// message content may be a string or a `{type, text}` object. Anything else
/// is rendered verbatim as a single user message.
fn parse_plugin_prompt_payload(fallback_description: &str, payload: Value) -> PromptResult {
    if payload.get("success") == Some(&Value::Bool(false)) {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("plugin prompt execution failed");
        return Err(McpError::InternalError(message.to_string()));
    }

    let data = payload.get("data").cloned().unwrap_or(Value::Null);

    let (description, raw_messages) = match &data {
        Value::Object(obj) => (
            obj.get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            obj.get("messages").and_then(Value::as_array).cloned(),
        ),
        Value::Array(messages) => (None, Some(messages.clone())),
        _ => (None, None),
    };

    let messages = match raw_messages {
        Some(entries) => entries.iter().map(parse_prompt_message).collect(),
        None => vec![PromptMessage::text(
            "user",
            serde_json::to_string_pretty(&data).unwrap_or_default(),
        )],
    };

    Ok(PromptsGetResult {
        description: description.or_else(|| {
            if fallback_description.is_empty() {
                None
            } else {
                Some(fallback_description.to_string())
            }
        }),
        messages,
    })
}

fn parse_prompt_message(entry: &Value) -> PromptMessage {
    let role = entry
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("user")
        .to_string();
    let text = match entry.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(obj)) => obj
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };
    PromptMessage::text(role, text)
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for registering a built-in prompt
pub struct PromptBuilder {
    name: String,
    description: String,
    arguments: Vec<PromptArgSpec>,
}

impl PromptBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            arguments: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn argument(mut self, arg: PromptArgSpec) -> Self {
        self.arguments.push(arg);
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> RegisteredPrompt
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PromptResult> + Send + 'static,
    {
        RegisteredPrompt {
            name: self.name,
            description: self.description,
            arguments: self.arguments,
            handler: PromptHandler::Builtin(Arc::new(move |ctx, params| {
                Box::pin(handler(ctx, params))
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_prompt() -> RegisteredPrompt {
        PromptBuilder::new("media-brief")
            .description("Brief about a title")
            .argument(PromptArgSpec::required("title", "Media title"))
            .build(|_ctx, args| async move {
                let title = args["title"].as_str().unwrap_or_default().to_string();
                Ok(PromptsGetResult {
                    description: Some("Brief".to_string()),
                    messages: vec![PromptMessage::text("user", format!("Brief on {}", title))],
                })
            })
    }

    #[test]
    fn test_list_includes_arguments() {
        let registry = PromptRegistry::new();
        registry.register_builtin(sample_prompt());

        let prompts = registry.list();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].name, "media-brief");
        assert_eq!(prompts[0].arguments.len(), 1);
        assert!(prompts[0].arguments[0].required);
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_an_error_result() {
        let registry = PromptRegistry::new();
        let ctx = ToolContext::for_tests();
        let err = registry.get(&ctx, "nope", json!({})).await.unwrap_err();
        assert_eq!(err.code(), -32001);
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let registry = PromptRegistry::new();
        registry.register_builtin(sample_prompt());
        let ctx = ToolContext::for_tests();
        let err = registry.get(&ctx, "media-brief", json!({})).await.unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[tokio::test]
    async fn test_builtin_prompt_renders() {
        let registry = PromptRegistry::new();
        registry.register_builtin(sample_prompt());
        let ctx = ToolContext::for_tests();
        let result = registry
            .get(&ctx, "media-brief", json!({"title": "Dune"}))
            .await
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, "user");
    }

    #[test]
    fn test_plugin_payload_with_message_list() {
        let payload = json!({
            "success": true,
            "message": "ok",
            "data": {
                "description": "from plugin",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": {"type": "text", "text": "hello"}}
                ]
            }
        });
        let result = parse_plugin_prompt_payload("fallback", payload).unwrap();
        assert_eq!(result.description.as_deref(), Some("from plugin"));
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[0].role, "system");
    }

    #[test]
    fn test_plugin_payload_failure() {
        let payload = json!({"success": false, "message": "boom", "data": null});
        let err = parse_plugin_prompt_payload("", payload).unwrap_err();
        assert_eq!(err.code(), -32603);
    }

    #[test]
    fn test_plugin_payload_bare_array() {
        let payload = json!({
            "success": true,
            "message": "ok",
            "data": [{"role": "assistant", "content": "done"}]
        });
        let result = parse_plugin_prompt_payload("desc", payload).unwrap();
        assert_eq!(result.description.as_deref(), Some("desc"));
        assert_eq!(result.messages[0].role, "assistant");
    }
}
