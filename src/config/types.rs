//! Configuration file types.
//!
//! These map one-to-one onto the TOML layout and know how to turn themselves
//! into the runtime values the rest of the crate consumes.

use crate::engine::{
    EngineRegistry, ExecutionLimits, ScriptEngine, TerminalEngine, TranspileOptions,
    TypedScriptEngine,
};
use crate::error::CodeloopError;
use crate::llm::{ProviderConfig, ProviderType};
use crate::logging::LoggingConfig;
use crate::messages::InvocationFormat;
use crate::orchestrator::{OrchestratorBuilder, DEFAULT_MAX_ITERATIONS, DEFAULT_MEMORY_WINDOW};
use crate::parser::DEFAULT_SENTINEL;
use crate::tracker::PROMPT_HISTORY;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
///
/// ```toml
/// default_provider = "local"
///
/// [providers.local]
/// type = "ollama"
/// model = "qwen2.5:7b"
///
/// [orchestrator]
/// max_iterations = 4
///
/// [execution]
/// timeout_secs = 10
/// shell = "sh"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeloopConfig {
    /// Named provider configurations.
    #[serde(default)]
    pub providers: HashMap<String, NamedProviderConfig>,

    /// The provider to use when none is named.
    ///
    /// If unset and exactly one provider is defined, that one is used.
    pub default_provider: Option<String>,

    /// Loop settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// Engine limits and terminal settings.
    #[serde(default)]
    pub execution: ExecutionSection,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CodeloopConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named provider.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, config: NamedProviderConfig) -> Self {
        self.providers.insert(name.into(), config);
        self
    }

    /// Sets the default provider name.
    #[must_use]
    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Returns the explicit default, or the only provider if there is one.
    #[must_use]
    pub fn effective_default(&self) -> Option<&str> {
        if let Some(ref name) = self.default_provider {
            return Some(name.as_str());
        }

        if self.providers.len() == 1 {
            return self.providers.keys().next().map(String::as_str);
        }

        None
    }

    /// Returns true if no providers are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns the number of providers defined.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Resolves a provider by name, or the effective default when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no provider can be selected, the
    /// named provider does not exist, or its settings are incomplete.
    pub fn provider(&self, name: Option<&str>) -> Result<ProviderConfig, CodeloopError> {
        let name = match name.or_else(|| self.effective_default()) {
            Some(name) => name,
            None if self.providers.is_empty() => {
                return Err(CodeloopError::configuration(
                    "providers",
                    "no providers configured; add a [providers.<name>] section",
                ))
            }
            None => {
                return Err(CodeloopError::configuration(
                    "default_provider",
                    "several providers are configured; set default_provider or pick one by name",
                ))
            }
        };

        let named = self.providers.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            CodeloopError::configuration(
                "default_provider",
                format!("unknown provider '{name}'; configured: {}", known.join(", ")),
            )
        })?;

        named.to_provider_config(name)
    }

    /// Creates an orchestrator builder from every section of this file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider cannot be resolved.
    pub fn orchestrator_builder(
        &self,
        provider: Option<&str>,
    ) -> Result<OrchestratorBuilder, CodeloopError> {
        let provider = self.provider(provider)?;
        Ok(self
            .orchestrator
            .apply(OrchestratorBuilder::default())
            .provider_config(provider)
            .registry(self.execution.registry()))
    }
}

/// Configuration for a single named provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedProviderConfig {
    /// Backend kind: "openai", "openai_compatible", or "ollama".
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    /// Model name.
    pub model: String,

    /// Direct API key value (prefer `api_key_env`).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl NamedProviderConfig {
    /// Creates an entry with only the required fields set.
    #[must_use]
    pub fn new(provider_type: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider_type,
            model: model.into(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            timeout_secs: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Creates an OpenAI entry reading its key from `OPENAI_API_KEY`.
    #[must_use]
    pub fn openai(model: impl Into<String>) -> Self {
        Self::new(ProviderType::OpenAI, model).with_api_key_env("OPENAI_API_KEY")
    }

    /// Creates an Ollama entry.
    #[must_use]
    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new(ProviderType::Ollama, model)
    }

    /// Sets the API key environment variable.
    #[must_use]
    pub fn with_api_key_env(mut self, env_var: impl Into<String>) -> Self {
        self.api_key_env = Some(env_var.into());
        self
    }

    /// Sets a direct API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Resolves the API key.
    ///
    /// Resolution order:
    /// 1. `api_key_env`, which must be set and non-empty if named
    /// 2. `OPENAI_API_KEY` for the hosted OpenAI backend
    /// 3. `api_key`
    /// 4. Empty string
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `api_key_env` names a variable that
    /// is unset or empty.
    pub fn resolve_api_key(&self, name: &str) -> Result<String, CodeloopError> {
        if let Some(ref env_var) = self.api_key_env {
            return match std::env::var(env_var) {
                Ok(key) if !key.trim().is_empty() => Ok(key),
                _ => Err(CodeloopError::configuration(
                    format!("providers.{name}.api_key_env"),
                    format!("environment variable '{env_var}' is not set"),
                )),
            };
        }

        if self.provider_type == ProviderType::OpenAI {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                if !key.is_empty() {
                    return Ok(key);
                }
            }
        }

        Ok(self.api_key.clone().unwrap_or_default())
    }

    /// Converts this entry to a validated runtime [`ProviderConfig`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key cannot be resolved or the
    /// resulting configuration does not validate.
    pub fn to_provider_config(&self, name: &str) -> Result<ProviderConfig, CodeloopError> {
        let api_key = self.resolve_api_key(name)?;

        let mut config = match self.provider_type {
            ProviderType::OpenAI => ProviderConfig::openai(api_key).with_model(&self.model),
            ProviderType::OpenAICompatible => ProviderConfig::openai_compatible(
                ProviderType::OpenAICompatible.default_base_url(),
                &self.model,
            )
            .with_api_key(api_key),
            ProviderType::Ollama => ProviderConfig::ollama(&self.model),
        };

        if let Some(ref url) = self.base_url {
            config = config.with_base_url(url);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(tokens) = self.max_tokens {
            config = config.with_max_tokens(tokens);
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }

        config.validate()?;
        Ok(config)
    }
}

/// The `[orchestrator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Marker sentinel
    pub sentinel: String,
    /// Provider calls per run
    pub max_iterations: usize,
    /// Memory entries replayed per call
    pub memory_window: usize,
    /// History entries listed in the system prompt
    pub history_in_prompt: usize,
    /// Base system prompt
    pub system_prompt: String,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            memory_window: DEFAULT_MEMORY_WINDOW,
            history_in_prompt: PROMPT_HISTORY,
            system_prompt: String::new(),
        }
    }
}

impl OrchestratorSection {
    /// Copies these settings onto a builder.
    #[must_use]
    pub fn apply(&self, builder: OrchestratorBuilder) -> OrchestratorBuilder {
        builder
            .sentinel(&self.sentinel)
            .max_iterations(self.max_iterations)
            .memory_window(self.memory_window)
            .history_in_prompt(self.history_in_prompt)
            .system_prompt(&self.system_prompt)
    }
}

/// The `[execution]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Wall-clock limit per invocation; 0 disables it
    pub timeout_secs: u64,
    /// Script operation limit; 0 disables it
    pub max_operations: u64,
    /// Insert runtime type checks for typed code
    pub strict_typing: bool,
    /// Reject unannotated bindings in typed code
    pub no_implicit_any: bool,
    /// Shell used for terminal blocks without an explicit one
    pub shell: String,
    /// Working directory for terminal blocks
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            timeout_secs: limits.timeout.map_or(0, |t| t.as_secs()),
            max_operations: limits.max_operations.unwrap_or(0),
            strict_typing: false,
            no_implicit_any: false,
            shell: "bash".to_string(),
            working_dir: None,
        }
    }
}

impl ExecutionSection {
    /// Returns the engine limits.
    #[must_use]
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            max_operations: (self.max_operations > 0).then_some(self.max_operations),
        }
    }

    /// Returns the typed-code options.
    #[must_use]
    pub fn transpile_options(&self) -> TranspileOptions {
        TranspileOptions::default()
            .with_strict(self.strict_typing)
            .with_no_implicit_any(self.no_implicit_any)
    }

    /// Builds the engine registry for every format.
    #[must_use]
    pub fn registry(&self) -> EngineRegistry {
        let limits = self.limits();
        let script = ScriptEngine::with_limits(limits);
        let typed = TypedScriptEngine::new(script.clone()).with_options(self.transpile_options());

        let mut terminal = TerminalEngine::new().with_shell(&self.shell);
        if let Some(timeout) = limits.timeout {
            terminal = terminal.with_timeout(timeout);
        }
        if let Some(ref dir) = self.working_dir {
            terminal = terminal.with_working_dir(dir);
        }

        EngineRegistry::empty()
            .with_engine(InvocationFormat::Code, script)
            .with_engine(InvocationFormat::TypedCode, typed)
            .with_engine(InvocationFormat::Terminal, terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_default_prefers_explicit() {
        let config = CodeloopConfig::new()
            .with_provider("a", NamedProviderConfig::ollama("m"))
            .with_provider("b", NamedProviderConfig::ollama("n"))
            .with_default_provider("b");

        assert_eq!(config.effective_default(), Some("b"));
    }

    #[test]
    fn effective_default_single_provider() {
        let config = CodeloopConfig::new().with_provider("only", NamedProviderConfig::ollama("m"));
        assert_eq!(config.effective_default(), Some("only"));
    }

    #[test]
    fn effective_default_ambiguous() {
        let config = CodeloopConfig::new()
            .with_provider("a", NamedProviderConfig::ollama("m"))
            .with_provider("b", NamedProviderConfig::ollama("n"));

        assert_eq!(config.effective_default(), None);
        assert!(config.provider(None).unwrap_err().is_configuration());
    }

    #[test]
    fn provider_empty_config_errors() {
        let err = CodeloopConfig::new().provider(None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("[providers.<name>]"));
    }

    #[test]
    fn provider_unknown_name_lists_known() {
        let config = CodeloopConfig::new().with_provider("local", NamedProviderConfig::ollama("m"));
        let err = config.provider(Some("remote")).unwrap_err();
        assert!(err.to_string().contains("local"));
    }

    #[test]
    fn ollama_entry_resolves_without_key() {
        let provider = NamedProviderConfig::ollama("qwen2.5:7b")
            .with_timeout_secs(42)
            .to_provider_config("local")
            .unwrap();

        assert_eq!(provider.provider_type, ProviderType::Ollama);
        assert_eq!(provider.options.model, "qwen2.5:7b");
        assert_eq!(provider.options.timeout, Duration::from_secs(42));
        assert!(provider.api_key.is_empty());
    }

    #[test]
    fn compatible_entry_uses_base_url_and_direct_key() {
        let provider = NamedProviderConfig::new(ProviderType::OpenAICompatible, "local-model")
            .with_base_url("http://127.0.0.1:9000/v1")
            .with_api_key("secret")
            .to_provider_config("lan")
            .unwrap();

        assert_eq!(provider.chat_endpoint(), "http://127.0.0.1:9000/v1/chat/completions");
        assert_eq!(provider.api_key, "secret");
    }

    #[test]
    fn missing_key_env_fails_fast() {
        let err = NamedProviderConfig::openai("gpt-4o")
            .with_api_key_env("CODELOOP_TEST_KEY_THAT_IS_NEVER_SET")
            .to_provider_config("cloud")
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("CODELOOP_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn execution_zero_disables_limits() {
        let section = ExecutionSection {
            timeout_secs: 0,
            max_operations: 0,
            ..Default::default()
        };
        assert_eq!(section.limits(), ExecutionLimits::unlimited());
    }

    #[test]
    fn execution_registry_covers_every_format() {
        let registry = ExecutionSection::default().registry();
        assert!(registry.get(InvocationFormat::Code).is_some());
        assert!(registry.get(InvocationFormat::TypedCode).is_some());
        assert!(registry.get(InvocationFormat::Terminal).is_some());
    }

    #[test]
    fn orchestrator_defaults() {
        let section = OrchestratorSection::default();
        assert_eq!(section.sentinel, DEFAULT_SENTINEL);
        assert_eq!(section.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
