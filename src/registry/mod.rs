//! Tool and prompt registries.
//!
//! Merges a static built-in set with a dynamic set contributed by external
//! plugins via the filesystem rendezvous. Dispatchers read immutable
//! snapshots; the watcher swaps them atomically.

pub mod builtin;
pub mod prompts;
pub mod tools;
pub mod validation;

pub use builtin::{register_builtin_prompts, register_builtin_tools};
pub use prompts::{
    PromptArgSpec, PromptBuilder, PromptHandler, PromptRegistry, RegisteredPrompt,
};
pub use tools::{RegisteredTool, ToolBuilder, ToolHandler, ToolRegistry};
pub use validation::{validate_arguments, ParamSpec, ParameterSchema};
