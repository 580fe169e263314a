//! Engine trait definitions.
//!
//! Engines hold a mutable context that persists across calls, so a value bound
//! by one payload is visible to the next.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::engine::error::EngineError;

/// The future returned by [`ExecutionEngine::execute`].
pub type EngineFuture = Pin<Box<dyn Future<Output = Result<Value, EngineError>> + Send + 'static>>;

/// A stateful sandbox executing one payload format.
///
/// # Example
///
/// ```rust,ignore
/// use codeloop::engine::{ExecutionEngine, ExecutionRequest, ScriptEngine};
///
/// let engine = ScriptEngine::new();
/// engine.execute(ExecutionRequest::new("let x = 40;")).await?;
/// let value = engine.execute(ExecutionRequest::new("x + 2")).await?;
/// assert_eq!(value, serde_json::json!(42));
/// ```
pub trait ExecutionEngine: Send + Sync + Debug {
    /// Executes a payload against the engine's persistent context.
    ///
    /// # Errors
    ///
    /// Rejects with an [`EngineError`] when the payload fails, exceeds its
    /// budget, or is cancelled.
    fn execute(&self, request: ExecutionRequest) -> EngineFuture;

    /// Merges values into the persistent context.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Context` if a value cannot be represented.
    fn update_context(&self, values: Map<String, Value>) -> Result<(), EngineError>;

    /// Drops every binding in the persistent context.
    fn clear_context(&self);

    /// Short engine name used in errors and logs.
    fn name(&self) -> &'static str;
}

/// A single payload to execute.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Source to run
    pub code: String,
    /// Values merged into the persistent context before this call runs
    pub extension: Map<String, Value>,
    /// Shell requested by a terminal invocation
    pub shell: Option<String>,
    /// Aborts the execution when cancelled
    pub cancellation: CancellationToken,
}

impl ExecutionRequest {
    /// Creates a request for the given source.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Adds per-call context values.
    #[must_use]
    pub fn with_extension(mut self, extension: Map<String, Value>) -> Self {
        self.extension = extension;
        self
    }

    /// Sets the shell for terminal payloads.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Budget applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Wall-clock limit, `None` for unlimited
    pub timeout: Option<Duration>,
    /// Script operation limit, `None` for unlimited
    pub max_operations: Option<u64>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            max_operations: Some(50_000_000),
        }
    }
}

impl ExecutionLimits {
    /// No limits at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            timeout: None,
            max_operations: None,
        }
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the operation limit.
    #[must_use]
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = Some(max_operations);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let token = CancellationToken::new();
        let mut extension = Map::new();
        extension.insert("n".to_string(), Value::from(3));

        let request = ExecutionRequest::new("n * 2")
            .with_extension(extension)
            .with_shell("zsh")
            .with_cancellation(token.clone());

        assert_eq!(request.code, "n * 2");
        assert_eq!(request.extension["n"], Value::from(3));
        assert_eq!(request.shell.as_deref(), Some("zsh"));
        token.cancel();
        assert!(request.cancellation.is_cancelled());
    }

    #[test]
    fn default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.timeout, Some(Duration::from_secs(30)));
        assert_eq!(limits.max_operations, Some(50_000_000));
        assert_eq!(ExecutionLimits::unlimited().timeout, None);
    }
}
