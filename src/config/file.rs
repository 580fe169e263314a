//! Configuration file loading.

use crate::config::types::CodeloopConfig;
use crate::error::CodeloopError;
use std::path::{Path, PathBuf};

/// Project-local configuration file name.
const LOCAL_CONFIG_NAME: &str = "codeloop.toml";

/// File name within the XDG config directory.
const XDG_CONFIG_NAME: &str = "config.toml";

/// Application name for XDG directory lookup.
const APP_NAME: &str = "codeloop";

/// Loads configuration from the default search paths.
///
/// Search order:
/// 1. `./codeloop.toml` (project-local)
/// 2. `~/.config/codeloop/config.toml` (XDG config)
///
/// Returns an empty configuration if no file is found.
///
/// # Errors
///
/// Returns a configuration error if a file exists but cannot be parsed.
///
/// # Example
///
/// ```rust,ignore
/// use codeloop::config::load;
///
/// let config = load()?;
/// if config.is_empty() {
///     println!("No configuration file found, using defaults");
/// }
/// ```
pub fn load() -> Result<CodeloopConfig, CodeloopError> {
    match search_paths().into_iter().find(|path| path.exists()) {
        Some(path) => from_path(&path),
        None => Ok(CodeloopConfig::default()),
    }
}

/// Loads configuration from a specific file.
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or does not
/// match the expected schema.
pub fn from_path(path: &Path) -> Result<CodeloopConfig, CodeloopError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CodeloopError::configuration(
            "config_file",
            format!("failed to read '{}': {}", path.display(), e),
        )
    })?;

    from_str(&contents).map_err(|e| {
        CodeloopError::configuration(
            "config_file",
            format!("failed to parse '{}': {}", path.display(), e),
        )
    })
}

/// Parses configuration from a TOML string.
///
/// # Errors
///
/// Returns a configuration error if the TOML is invalid or doesn't match the schema.
///
/// # Example
///
/// ```rust
/// use codeloop::config::from_str;
///
/// let config = from_str(r#"
/// default_provider = "local"
///
/// [providers.local]
/// type = "ollama"
/// model = "qwen2.5:7b"
/// "#).unwrap();
///
/// assert_eq!(config.effective_default(), Some("local"));
/// ```
pub fn from_str(toml_str: &str) -> Result<CodeloopConfig, CodeloopError> {
    toml::from_str(toml_str)
        .map_err(|e| CodeloopError::configuration("config", format!("invalid TOML: {e}")))
}

/// Returns the paths searched for configuration files, in order.
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];

    if let Some(dir) = xdg_config_dir() {
        paths.push(dir.join(XDG_CONFIG_NAME));
    }

    paths
}

/// Returns the XDG config directory for codeloop, `~/.config/codeloop` on most systems.
#[must_use]
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}
