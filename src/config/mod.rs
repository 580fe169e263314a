//! Configuration loading.
//!
//! Configuration is stored in TOML. The search order is:
//! 1. `./codeloop.toml` (project-local)
//! 2. `~/.config/codeloop/config.toml` (XDG config)
//!
//! # Example Configuration
//!
//! ```toml
//! default_provider = "local"
//!
//! [providers.local]
//! type = "ollama"
//! model = "qwen2.5:7b"
//! timeout_secs = 300
//!
//! [providers.cloud]
//! type = "openai"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [orchestrator]
//! sentinel = "@@"
//! max_iterations = 3
//! memory_window = 10
//! history_in_prompt = 5
//! system_prompt = "You are a careful analyst."
//!
//! [execution]
//! timeout_secs = 30
//! max_operations = 50000000
//! strict_typing = false
//! shell = "bash"
//!
//! [logging]
//! enabled = true
//! level = "info"
//! ```

mod file;
mod types;

pub use file::{from_path, from_str, load, search_paths, xdg_config_dir};
pub use types::{CodeloopConfig, ExecutionSection, NamedProviderConfig, OrchestratorSection};
