//! Engine registry and invocation dispatch.
//!
//! The registry is a plain value owned by whoever builds the orchestrator. It
//! is never global, so two orchestrators with separate registries share no
//! execution context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::error::EngineError;
use crate::engine::gate::{ConfirmationGate, CANCELLED_RESPONSE};
use crate::engine::script::ScriptEngine;
use crate::engine::terminal::TerminalEngine;
use crate::engine::traits::{ExecutionEngine, ExecutionLimits, ExecutionRequest};
use crate::engine::transpile::TranspileOptions;
use crate::engine::typed::TypedScriptEngine;
use crate::messages::{Invocation, InvocationFormat};

/// Maps payload formats to engines.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    engines: HashMap<InvocationFormat, Arc<dyn ExecutionEngine>>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::standard(ExecutionLimits::default(), TranspileOptions::default())
    }
}

impl EngineRegistry {
    /// Creates a registry with no engines.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Creates the standard registry.
    ///
    /// `code` and `typed-code` share one script context. Terminal commands
    /// run in `bash` with the same wall-clock budget.
    #[must_use]
    pub fn standard(limits: ExecutionLimits, options: TranspileOptions) -> Self {
        let script = ScriptEngine::with_limits(limits);
        let typed = TypedScriptEngine::new(script.clone()).with_options(options);
        let mut terminal = TerminalEngine::new();
        if let Some(timeout) = limits.timeout {
            terminal = terminal.with_timeout(timeout);
        }

        Self::empty()
            .with_engine(InvocationFormat::Code, script)
            .with_engine(InvocationFormat::TypedCode, typed)
            .with_engine(InvocationFormat::Terminal, terminal)
    }

    /// Registers an engine, replacing any previous one for the format.
    #[must_use]
    pub fn with_engine(mut self, format: InvocationFormat, engine: impl ExecutionEngine + 'static) -> Self {
        self.register(format, Arc::new(engine));
        self
    }

    /// Registers an engine, returning the one it replaced.
    pub fn register(
        &mut self,
        format: InvocationFormat,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Option<Arc<dyn ExecutionEngine>> {
        debug!(format = %format, engine = engine.name(), "Registering engine");
        self.engines.insert(format, engine)
    }

    /// Returns the engine for a format.
    #[must_use]
    pub fn get(&self, format: InvocationFormat) -> Option<&Arc<dyn ExecutionEngine>> {
        self.engines.get(&format)
    }

    /// Returns true if an engine is registered for the format.
    #[must_use]
    pub fn contains(&self, format: InvocationFormat) -> bool {
        self.engines.contains_key(&format)
    }

    /// Merges values into the context of the engine for `format`.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` if no engine handles the format, or the
    /// engine's own context error.
    pub fn update_context(
        &self,
        format: InvocationFormat,
        values: Map<String, Value>,
    ) -> Result<(), EngineError> {
        self.get(format)
            .ok_or_else(|| EngineError::not_configured(format))?
            .update_context(values)
    }

    /// Clears the context of every registered engine.
    pub fn clear_contexts(&self) {
        for engine in self.engines.values() {
            engine.clear_context();
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Turns an invocation into its raw response.
///
/// The orchestrator calls this for every invocation. Replace it to route
/// payloads somewhere other than the engine registry.
#[async_trait]
pub trait InvocationHandler: Send + Sync + fmt::Debug {
    /// Executes the invocation and returns its raw response.
    ///
    /// # Errors
    ///
    /// Any error is rendered as an `"Error: ..."` response by the caller.
    async fn handle(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError>;
}

/// Default handler: optional confirmation, then the registry.
#[derive(Debug, Clone, Default)]
pub struct EngineDispatcher {
    registry: EngineRegistry,
    gate: Option<Arc<dyn ConfirmationGate>>,
}

impl EngineDispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: EngineRegistry) -> Self {
        Self {
            registry,
            gate: None,
        }
    }

    /// Adds a confirmation gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }
}

#[async_trait]
impl InvocationHandler for EngineDispatcher {
    async fn handle(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if let Some(gate) = &self.gate {
            if !gate.confirm(invocation).await {
                info!(id = %invocation.id, "Invocation denied by confirmation gate");
                return Ok(CANCELLED_RESPONSE.to_string());
            }
        }

        let engine = self
            .registry
            .get(invocation.format)
            .ok_or_else(|| EngineError::not_configured(invocation.format))?;

        let mut request =
            ExecutionRequest::new(invocation.request.clone()).with_cancellation(cancel.clone());
        if let Some(shell) = &invocation.shell {
            request = request.with_shell(shell.clone());
        }

        let value = engine.execute(request).await?;
        Ok(render_value(&value))
    }
}

/// Puts a confirmation gate in front of another handler.
#[derive(Debug, Clone)]
pub struct GatedHandler {
    inner: Arc<dyn InvocationHandler>,
    gate: Arc<dyn ConfirmationGate>,
}

impl GatedHandler {
    /// Asks `gate` before every call reaches `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn InvocationHandler>, gate: Arc<dyn ConfirmationGate>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl InvocationHandler for GatedHandler {
    async fn handle(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        if !self.gate.confirm(invocation).await {
            info!(id = %invocation.id, "Invocation denied by confirmation gate");
            return Ok(CANCELLED_RESPONSE.to_string());
        }
        self.inner.handle(invocation, cancel).await
    }
}

/// Renders an engine value as a raw response string.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Handler backed by a synchronous closure.
pub struct FnHandler<F> {
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Invocation) -> Result<String, EngineError> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> InvocationHandler for FnHandler<F>
where
    F: Fn(&Invocation) -> Result<String, EngineError> + Send + Sync,
{
    async fn handle(
        &self,
        invocation: &Invocation,
        _cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        (self.handler)(invocation)
    }
}
