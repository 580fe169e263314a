//! Orchestrator construction.

use std::sync::Arc;

use tracing::debug;

use crate::engine::{
    ConfirmationGate, EngineDispatcher, EngineRegistry, GatedHandler, InvocationHandler,
};
use crate::error::CodeloopError;
use crate::llm::{connect, OptionsPatch, Provider, ProviderConfig};
use crate::messages::MemoryEntry;
use crate::orchestrator::context::DEFAULT_MEMORY_WINDOW;
use crate::orchestrator::memory::{Memory, MemoryObserver};
use crate::orchestrator::run::{Orchestrator, DEFAULT_MAX_ITERATIONS};
use crate::parser::{InvocationParser, DEFAULT_SENTINEL};
use crate::tracker::{ResultsTracker, PROMPT_HISTORY};

/// Builder for [`Orchestrator`].
///
/// # Example
///
/// ```rust,ignore
/// use codeloop::prelude::*;
///
/// let mut orchestrator = Orchestrator::builder()
///     .ollama("qwen2.5:7b")
///     .system_prompt("You are a careful analyst.")
///     .max_iterations(4)
///     .build()?;
///
/// let answer = orchestrator.run("What is 17 * 23?").await?;
/// ```
#[derive(Default)]
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn Provider>>,
    provider_config: Option<ProviderConfig>,
    system_prompt: String,
    sentinel: Option<String>,
    max_iterations: Option<usize>,
    memory_window: Option<usize>,
    history_in_prompt: Option<usize>,
    registry: Option<EngineRegistry>,
    handler: Option<Arc<dyn InvocationHandler>>,
    gate: Option<Arc<dyn ConfirmationGate>>,
    observer: Option<MemoryObserver>,
    seed: Option<String>,
    overrides: Option<OptionsPatch>,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("provider", &self.provider)
            .field("provider_config", &self.provider_config)
            .field("sentinel", &self.sentinel)
            .field("max_iterations", &self.max_iterations)
            .field("memory_window", &self.memory_window)
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    /// Uses an already constructed provider.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Connects to the provider described by `config` at build time.
    #[must_use]
    pub fn provider_config(mut self, config: ProviderConfig) -> Self {
        self.provider_config = Some(config);
        self
    }

    /// Uses a local Ollama daemon with the given model.
    #[must_use]
    pub fn ollama(self, model: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::ollama(model))
    }

    /// Uses the hosted OpenAI API.
    #[must_use]
    pub fn openai(self, api_key: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::openai(api_key))
    }

    /// Sets the base system prompt. Marker instructions are always appended.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the marker sentinel (default `@@`).
    #[must_use]
    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }

    /// Sets the maximum provider calls per run (default 3).
    #[must_use]
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Sets how many memory entries are replayed per call (default 10).
    #[must_use]
    pub fn memory_window(mut self, entries: usize) -> Self {
        self.memory_window = Some(entries);
        self
    }

    /// Sets how many history entries appear in the system prompt (default 5).
    #[must_use]
    pub fn history_in_prompt(mut self, entries: usize) -> Self {
        self.history_in_prompt = Some(entries);
        self
    }

    /// Uses a custom engine registry.
    #[must_use]
    pub fn registry(mut self, registry: EngineRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces engine dispatch entirely.
    ///
    /// The registry is ignored when a handler is set. A configured gate
    /// still runs in front of it.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn InvocationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Asks `gate` before every invocation runs.
    #[must_use]
    pub fn gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Observes every memory append.
    #[must_use]
    pub fn observer(mut self, observer: impl Fn(&MemoryEntry) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Seeds memory with a system message that survives resets.
    #[must_use]
    pub fn memory_seed(mut self, content: impl Into<String>) -> Self {
        self.seed = Some(content.into());
        self
    }

    /// Applies request option overrides to every provider call.
    #[must_use]
    pub fn request_options(mut self, overrides: OptionsPatch) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Validates the configuration and builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no provider is set, the provider
    /// configuration is invalid, the sentinel is empty, or the iteration
    /// ceiling is zero.
    pub fn build(self) -> Result<Orchestrator, CodeloopError> {
        let sentinel = self.sentinel.unwrap_or_else(|| DEFAULT_SENTINEL.to_string());
        if sentinel.trim().is_empty() {
            return Err(CodeloopError::configuration(
                "sentinel",
                "sentinel cannot be empty; markers would match every quoted line",
            ));
        }

        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(CodeloopError::configuration(
                "max_iterations",
                "at least one provider call is required",
            ));
        }

        let provider = match (self.provider, self.provider_config) {
            (Some(provider), _) => provider,
            (None, Some(config)) => connect(&config)?,
            (None, None) => {
                return Err(CodeloopError::configuration(
                    "provider",
                    "no provider configured; use provider(), provider_config(), ollama(), or openai()",
                ))
            }
        };

        let registry = self.registry.unwrap_or_default();
        let handler = match (self.handler, self.gate) {
            (Some(handler), None) => handler,
            (Some(handler), Some(gate)) => Arc::new(GatedHandler::new(handler, gate)),
            (None, gate) => {
                let mut dispatcher = EngineDispatcher::new(registry.clone());
                if let Some(gate) = gate {
                    dispatcher = dispatcher.with_gate(gate);
                }
                Arc::new(dispatcher)
            }
        };

        let mut memory = Memory::new();
        if let Some(observer) = self.observer {
            memory = memory.with_observer(observer);
        }
        if let Some(seed) = self.seed {
            memory = memory.with_seed(seed);
        }

        debug!(
            provider = provider.provider_name(),
            sentinel = %sentinel,
            max_iterations,
            "Orchestrator built"
        );

        Ok(Orchestrator {
            provider,
            parser: InvocationParser::new(sentinel),
            handler,
            registry,
            memory,
            tracker: ResultsTracker::new(),
            system_prompt: self.system_prompt,
            max_iterations,
            memory_window: self.memory_window.unwrap_or(DEFAULT_MEMORY_WINDOW),
            history_in_prompt: self.history_in_prompt.unwrap_or(PROMPT_HISTORY),
            overrides: self.overrides,
        })
    }
}
