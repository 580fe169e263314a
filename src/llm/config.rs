//! Provider configuration.
//!
//! A [`ProviderConfig`] names the backend and its endpoint. The per-request
//! knobs live in [`RequestOptions`] and can be patched at runtime through
//! [`OptionsPatch`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::llm::error::LLMError;

/// The kind of backend a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// The hosted OpenAI API; requires an API key
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    /// Any server speaking the OpenAI chat completions protocol
    #[serde(rename = "openai_compatible")]
    OpenAICompatible,
    /// A local Ollama daemon speaking newline-delimited JSON
    Ollama,
}

impl ProviderType {
    /// Returns the configuration spelling of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::OpenAICompatible => "openai_compatible",
            Self::Ollama => "ollama",
        }
    }

    /// Returns true if requests must carry an API key.
    #[must_use]
    pub fn requires_api_key(self) -> bool {
        matches!(self, Self::OpenAI)
    }

    /// Returns the default base URL for this backend.
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::OpenAICompatible => "http://localhost:8080/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

/// Options applied to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Model name
    pub model: String,
    /// Sampling temperature; backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Request timeout
    pub timeout: Duration,
}

impl RequestOptions {
    /// Creates options for a model with default limits.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }

    /// Applies a patch in place.
    pub fn apply(&mut self, patch: &OptionsPatch) {
        if let Some(model) = &patch.model {
            self.model.clone_from(model);
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = Some(temperature);
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(timeout) = patch.timeout {
            self.timeout = timeout;
        }
    }

    /// Returns a copy with an optional patch applied.
    #[must_use]
    pub fn merged(&self, patch: Option<&OptionsPatch>) -> Self {
        let mut options = self.clone();
        if let Some(patch) = patch {
            options.apply(patch);
        }
        options
    }
}

/// A partial update to [`RequestOptions`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsPatch {
    /// New model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// New sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// New token limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// New request timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl OptionsPatch {
    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Configuration for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The backend type
    pub provider_type: ProviderType,
    /// API key; may be empty for local backends
    pub api_key: String,
    /// Base URL of the API
    pub base_url: String,
    /// Initial request options
    pub options: RequestOptions,
}

impl ProviderConfig {
    /// Creates a configuration for the hosted OpenAI API.
    ///
    /// # Examples
    ///
    /// ```
    /// use codeloop::llm::ProviderConfig;
    ///
    /// let config = ProviderConfig::openai("sk-...");
    /// assert_eq!(config.options.model, "gpt-4o");
    /// assert!(config.validate().is_ok());
    /// ```
    #[must_use]
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: api_key.into(),
            base_url: ProviderType::OpenAI.default_base_url().to_string(),
            options: RequestOptions::new("gpt-4o"),
        }
    }

    /// Creates a configuration for an OpenAI-compatible endpoint.
    #[must_use]
    pub fn openai_compatible(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let mut options = RequestOptions::new(model);
        options.timeout = Duration::from_secs(300);
        Self {
            provider_type: ProviderType::OpenAICompatible,
            api_key: String::new(),
            base_url: base_url.into(),
            options,
        }
    }

    /// Creates a configuration for a local Ollama daemon.
    ///
    /// # Examples
    ///
    /// ```
    /// use codeloop::llm::ProviderConfig;
    ///
    /// let config = ProviderConfig::ollama("llama3.2");
    /// assert!(config.api_key.is_empty());
    /// assert_eq!(config.chat_endpoint(), "http://localhost:11434/api/chat");
    /// ```
    #[must_use]
    pub fn ollama(model: impl Into<String>) -> Self {
        let mut options = RequestOptions::new(model);
        options.timeout = Duration::from_secs(300);
        Self {
            provider_type: ProviderType::Ollama,
            api_key: String::new(),
            base_url: ProviderType::Ollama.default_base_url().to_string(),
            options,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    /// Sets the maximum tokens to generate.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Returns the chat endpoint URL.
    #[must_use]
    pub fn chat_endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.provider_type {
            ProviderType::OpenAI | ProviderType::OpenAICompatible => {
                format!("{base}/chat/completions")
            }
            ProviderType::Ollama => format!("{base}/api/chat"),
        }
    }

    /// Checks the configuration before any request is made.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a missing API key on a backend that needs
    /// one, an empty model, an empty base URL, or a zero timeout.
    pub fn validate(&self) -> Result<(), LLMError> {
        if self.provider_type.requires_api_key() && self.api_key.trim().is_empty() {
            return Err(LLMError::invalid_config(
                "api_key",
                format!(
                    "{} requires an API key; set api_key or api_key_env",
                    self.provider_type.as_str()
                ),
            ));
        }
        if self.options.model.trim().is_empty() {
            return Err(LLMError::invalid_config("model", "model cannot be empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(LLMError::invalid_config("base_url", "base URL cannot be empty"));
        }
        if self.options.timeout.is_zero() {
            return Err(LLMError::invalid_config("timeout", "timeout must be positive"));
        }
        Ok(())
    }
}
