//! Built-in tools and prompts.
//!
//! The static set registered at boot. Tools proxy the host backend through
//! the upstream client; what each backend endpoint means is the backend's
//! concern.

use serde_json::{json, Value};
use tracing::info;

use super::prompts::{PromptArgSpec, PromptBuilder, PromptRegistry};
use super::tools::{ToolBuilder, ToolRegistry};
use super::validation::{ParamSpec, ParameterSchema};
use crate::mcp::protocol::{McpError, PromptMessage, PromptsGetResult};

/// Register all built-in tools with the registry
pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register_builtin(
        ToolBuilder::new("search-media")
            .description("Search the media library and indexers by keyword")
            .schema(ParameterSchema::Compact(vec![
                ParamSpec::required("keyword", "Search keyword", "string"),
                ParamSpec::optional("type", "Restrict the result type", "string")
                    .with_enum(&["media", "person"]),
            ]))
            .build(|ctx, args| async move {
                let mut query = vec![(
                    "keyword".to_string(),
                    args["keyword"].as_str().unwrap_or_default().to_string(),
                )];
                if let Some(kind) = args.get("type").and_then(Value::as_str) {
                    query.push(("type".to_string(), kind.to_string()));
                }
                let response = ctx.upstream.get("/api/v1/search", Some(&query)).await?;
                Ok(response.into_json()?)
            }),
    );

    registry.register_builtin(
        ToolBuilder::new("list-subscriptions")
            .description("List the backend's active media subscriptions")
            .build(|ctx, _args| async move {
                let response = ctx.upstream.get("/api/v1/subscribe", None).await?;
                Ok(response.into_json()?)
            }),
    );

    registry.register_builtin(
        ToolBuilder::new("get-downloads")
            .description("List download tasks known to the backend")
            .schema(ParameterSchema::Compact(vec![ParamSpec::optional(
                "status",
                "Filter by task status",
                "string",
            )]))
            .build(|ctx, args| async move {
                let query: Vec<(String, String)> = args
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|status| vec![("status".to_string(), status.to_string())])
                    .unwrap_or_default();
                let query = if query.is_empty() { None } else { Some(query.as_slice()) };
                let response = ctx.upstream.get("/api/v1/download", query).await?;
                Ok(response.into_json()?)
            }),
    );

    registry.register_builtin(
        ToolBuilder::new("server-info")
            .description("Bridge uptime, version, and upstream reachability")
            .build(|ctx, _args| async move {
                let reachable = ctx.upstream.health_check().await;
                Ok(json!({
                    "version": ctx.server_version,
                    "uptime_secs": ctx.start_time.elapsed().as_secs(),
                    "upstream_url": ctx.upstream.base_url(),
                    "upstream_reachable": reachable,
                }))
            }),
    );

    info!("Registered {} built-in tools", registry.tool_count());
}

/// Register all built-in prompts with the registry
pub fn register_builtin_prompts(registry: &PromptRegistry) {
    registry.register_builtin(
        PromptBuilder::new("media-brief")
            .description("Compose a short brief about one media title")
            .argument(PromptArgSpec::required("title", "The media title"))
            .build(|_ctx, args| async move {
                let title = args
                    .get("title")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidParams("title must be a string".to_string()))?
                    .to_string();
                Ok(PromptsGetResult {
                    description: Some(format!("Brief for '{}'", title)),
                    messages: vec![
                        PromptMessage::text(
                            "system",
                            "You are the media librarian for this server. Answer from the \
                             library's perspective and keep it short.",
                        ),
                        PromptMessage::text(
                            "user",
                            format!(
                                "Use the search-media tool to look up '{}' and write a short \
                                 brief: availability, year, and whether it is already subscribed.",
                                title
                            ),
                        ),
                    ],
                })
            }),
    );

    registry.register_builtin(
        PromptBuilder::new("library-summary")
            .description("Summarize subscriptions and current downloads")
            .build(|_ctx, _args| async move {
                Ok(PromptsGetResult {
                    description: Some("Library status summary".to_string()),
                    messages: vec![PromptMessage::text(
                        "user",
                        "Call list-subscriptions and get-downloads, then summarize what the \
                         server is tracking and what is currently downloading.",
                    )],
                })
            }),
    );

    info!("Registered {} built-in prompts", registry.prompt_count());
}
