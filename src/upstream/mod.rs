//! HTTP client for communicating with the host media-automation backend.
//!
//! One long-lived client shared process-wide. Every call attaches the current
//! upstream bearer token; network failures and 401s (the token may have
//! rotated) are retried with linear backoff before surfacing.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tokens::TokenManager;

/// Default request timeout towards the backend.
pub const UPSTREAM_TIMEOUT_SECS: u64 = 600;

const MAX_RETRIES: u32 = 3;

/// Errors surfaced to callers after retries are exhausted.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// Successful upstream response body, by shape.
#[derive(Debug, Clone)]
pub enum UpstreamResponse {
    Json(Value),
    Text(String),
    Empty,
}

impl UpstreamResponse {
    /// The JSON payload, or an error if the backend returned something else.
    pub fn into_json(self) -> Result<Value, UpstreamError> {
        match self {
            UpstreamResponse::Json(value) => Ok(value),
            UpstreamResponse::Text(text) => Err(UpstreamError::InvalidResponse(format!(
                "expected JSON, got text: {}",
                truncate(&text, 200)
            ))),
            UpstreamResponse::Empty => Err(UpstreamError::InvalidResponse(
                "expected JSON, got empty body".to_string(),
            )),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

/// Client for the host backend at `http://localhost:<moviepilot_port>`.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    tokens: TokenManager,
}

impl UpstreamClient {
    /// Create a new UpstreamClient.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the backend (e.g., "http://localhost:3001")
    /// * `timeout_secs` - Request timeout in seconds
    /// * `tokens` - Token manager supplying the upstream bearer token
    pub fn new(base_url: String, timeout_secs: u64, tokens: TokenManager) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Get the base URL of the backend.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the backend is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }

    /// Issue a request to the backend, with retry.
    ///
    /// Network errors and HTTP 401 are retried up to three times with linear
    /// backoff (1s, 2s, 3s); other HTTP errors surface immediately.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: Option<&[(String, String)]>,
        json_body: Option<&Value>,
        form: Option<&HashMap<String, String>>,
        token_override: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut attempt: u32 = 0;
        loop {
            let token = match token_override {
                Some(t) => t.to_string(),
                None => self.tokens.upstream_token(),
            };

            let mut builder = self.client.request(method.clone(), &url);
            if !token.is_empty() {
                builder = builder.bearer_auth(&token);
            }
            if let Some(query) = query {
                builder = builder.query(query);
            }
            if let Some(body) = json_body {
                builder = builder.json(body);
            }
            if let Some(form) = form {
                builder = builder.form(form);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        let backoff = Duration::from_secs(attempt as u64);
                        warn!(
                            "Upstream request to {} failed ({}), retry {}/{} in {:?}",
                            endpoint, e, attempt, MAX_RETRIES, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(UpstreamError::Network(e.to_string()));
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && attempt < MAX_RETRIES {
                // The upstream token may have rotated under us.
                attempt += 1;
                let backoff = Duration::from_secs(attempt as u64);
                warn!(
                    "Upstream request to {} got 401, retry {}/{} in {:?}",
                    endpoint, attempt, MAX_RETRIES, backoff
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(UpstreamError::Http {
                    status: status.as_u16(),
                    body: truncate(&body, 1000),
                });
            }

            let text = response
                .text()
                .await
                .map_err(|e| UpstreamError::Network(e.to_string()))?;
            if text.is_empty() {
                return Ok(UpstreamResponse::Empty);
            }
            return match serde_json::from_str::<Value>(&text) {
                Ok(value) => Ok(UpstreamResponse::Json(value)),
                Err(_) => Ok(UpstreamResponse::Text(text)),
            };
        }
    }

    /// GET an endpoint with optional query parameters.
    pub async fn get(
        &self,
        endpoint: &str,
        query: Option<&[(String, String)]>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.request(Method::GET, endpoint, query, None, None, None)
            .await
    }

    /// POST a JSON body to an endpoint.
    pub async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.request(Method::POST, endpoint, None, Some(body), None, None)
            .await
    }

    /// Execute a plugin-contributed tool through the host's plugin API.
    ///
    /// POSTs `{tool_name, arguments}` to the plugin's execute endpoint and
    /// returns the `{success, data, message}` payload.
    pub async fn execute_plugin_tool(
        &self,
        endpoint: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<Value, UpstreamError> {
        debug!("Dispatching tool '{}' to plugin endpoint {}", tool_name, endpoint);
        let body = json!({
            "tool_name": tool_name,
            "arguments": arguments,
        });
        self.post_json(endpoint, &body).await?.into_json()
    }

    /// Execute a plugin-contributed prompt through the host's plugin API.
    pub async fn execute_plugin_prompt(
        &self,
        endpoint: &str,
        prompt_name: &str,
        arguments: &Value,
    ) -> Result<Value, UpstreamError> {
        debug!(
            "Dispatching prompt '{}' to plugin endpoint {}",
            prompt_name, endpoint
        );
        let body = json!({
            "prompt_name": prompt_name,
            "arguments": arguments,
        });
        self.post_json(endpoint, &body).await?.into_json()
    }
}
