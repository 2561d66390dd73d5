//! Plugin rendezvous watcher.
//!
//! Sibling plugins publish their tools and prompts by writing two JSON files
//! next to the server (`plugin_tools.json`, `plugin_prompts.json`). A
//! dedicated thread per file polls the mtime every few seconds and, on
//! change, reads the file through [`crate::safe_io`] and reconciles the
//! corresponding registry in one atomic snapshot swap. Read or parse
//! failures keep the previous in-memory state and back off before retrying.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::registry::{
    ParameterSchema, PromptArgSpec, PromptHandler, PromptRegistry, RegisteredPrompt,
    RegisteredTool, ToolHandler, ToolRegistry,
};
use crate::safe_io;

/// Default mtime polling period.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Pause after an I/O or parse failure before the next attempt.
const ERROR_PAUSE: Duration = Duration::from_secs(10);

/// File names looked up next to the server binary.
pub const PLUGIN_TOOLS_FILE: &str = "plugin_tools.json";
pub const PLUGIN_PROMPTS_FILE: &str = "plugin_prompts.json";

// ============================================================================
// Rendezvous file shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct PluginToolsEntry {
    #[serde(default)]
    tools: Vec<PluginToolSpec>,
}

#[derive(Debug, Deserialize)]
struct PluginToolSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Option<Value>,
    #[serde(default)]
    api_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PluginPromptsEntry {
    #[serde(default)]
    prompts: Vec<PluginPromptSpec>,
}

#[derive(Debug, Deserialize)]
struct PluginPromptSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Option<Vec<PromptArgSpec>>,
    #[serde(default)]
    api_endpoint: Option<String>,
}

fn default_tool_endpoint(plugin_id: &str) -> String {
    format!("/api/v1/plugin/{}/mcp_tool_execute", plugin_id)
}

fn default_prompt_endpoint(plugin_id: &str) -> String {
    format!("/api/v1/plugin/{}/mcp_prompt_execute", plugin_id)
}

fn parse_tool_sets(value: &Value) -> Result<BTreeMap<String, Vec<RegisteredTool>>, String> {
    let file: HashMap<String, PluginToolsEntry> =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    let mut sets = BTreeMap::new();
    for (plugin_id, entry) in file {
        let tools = entry
            .tools
            .into_iter()
            .map(|spec| RegisteredTool {
                schema: ParameterSchema::from_value(spec.parameters.as_ref()),
                handler: ToolHandler::Plugin {
                    plugin_id: plugin_id.clone(),
                    endpoint: spec
                        .api_endpoint
                        .unwrap_or_else(|| default_tool_endpoint(&plugin_id)),
                },
                name: spec.name,
                description: spec.description,
                validate: true,
            })
            .collect();
        sets.insert(plugin_id, tools);
    }
    Ok(sets)
}

fn parse_prompt_sets(value: &Value) -> Result<BTreeMap<String, Vec<RegisteredPrompt>>, String> {
    let file: HashMap<String, PluginPromptsEntry> =
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

    let mut sets = BTreeMap::new();
    for (plugin_id, entry) in file {
        let prompts = entry
            .prompts
            .into_iter()
            .map(|spec| RegisteredPrompt {
                handler: PromptHandler::Plugin {
                    plugin_id: plugin_id.clone(),
                    endpoint: spec
                        .api_endpoint
                        .unwrap_or_else(|| default_prompt_endpoint(&plugin_id)),
                },
                name: spec.name,
                description: spec.description,
                arguments: spec.parameters.unwrap_or_default(),
            })
            .collect();
        sets.insert(plugin_id, prompts);
    }
    Ok(sets)
}

// ============================================================================
// Watcher
// ============================================================================

/// Handle to a running watcher thread. Stops the thread on [`stop`] or drop;
/// the thread exits within one polling interval.
pub struct WatcherHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn stop(mut self) {
        self.signal_and_join();
    }

    fn signal_and_join(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.signal_and_join();
    }
}

struct WatchLoop {
    name: &'static str,
    path: PathBuf,
    poll_interval: Duration,
    last_mtime: Option<SystemTime>,
}

impl WatchLoop {
    /// One poll iteration. Returns the pause before the next one.
    fn tick(&mut self, apply: &dyn Fn(&Value) -> Result<(), String>) -> Duration {
        let mtime = match fs::metadata(&self.path) {
            Ok(meta) => meta.modified().ok(),
            // A missing file is not an error, just nothing registered yet.
            Err(_) => None,
        };

        if mtime == self.last_mtime {
            return self.poll_interval;
        }

        // Missing and zero-byte files reconcile against the empty set; an
        // unreadable file keeps the previous registrations.
        let value = match safe_io::read_json_checked(&self.path) {
            Ok(Some(value)) => value,
            Ok(None) => Value::Object(serde_json::Map::new()),
            Err(e) => {
                warn!(
                    "{}: failed to read {:?} ({:#}), keeping previous registrations",
                    self.name, self.path, e
                );
                return ERROR_PAUSE;
            }
        };

        match apply(&value) {
            Ok(()) => {
                debug!("{}: reconciled from {:?}", self.name, self.path);
                self.last_mtime = mtime;
                self.poll_interval
            }
            Err(e) => {
                warn!(
                    "{}: failed to parse {:?} ({}), keeping previous registrations",
                    self.name, self.path, e
                );
                ERROR_PAUSE
            }
        }
    }
}

fn spawn_watcher(
    name: &'static str,
    path: PathBuf,
    poll_interval: Duration,
    apply: impl Fn(&Value) -> Result<(), String> + Send + 'static,
) -> WatcherHandle {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let thread = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            info!("{} watching {:?}", name, path);
            let mut watch = WatchLoop {
                name,
                path,
                poll_interval,
                last_mtime: None,
            };
            let mut pause = Duration::ZERO;
            loop {
                match stop_rx.recv_timeout(pause) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                pause = watch.tick(&apply);
            }
            info!("{} stopped", name);
        })
        .expect("Failed to spawn watcher thread");

    WatcherHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    }
}

/// Watch `plugin_tools.json` and reconcile the tool registry.
pub fn spawn_tool_watcher(
    path: PathBuf,
    registry: Arc<ToolRegistry>,
    poll_interval: Duration,
) -> WatcherHandle {
    spawn_watcher("plugin-tools-watcher", path, poll_interval, move |value| {
        let sets = parse_tool_sets(value)?;
        registry.apply_plugin_tools(sets);
        Ok(())
    })
}

/// Watch `plugin_prompts.json` and reconcile the prompt registry.
pub fn spawn_prompt_watcher(
    path: PathBuf,
    registry: Arc<PromptRegistry>,
    poll_interval: Duration,
) -> WatcherHandle {
    spawn_watcher(
        "plugin-prompts-watcher",
        path,
        poll_interval,
        move |value| {
            let sets = parse_prompt_sets(value)?;
            registry.apply_plugin_prompts(sets);
            Ok(())
        },
    )
}
