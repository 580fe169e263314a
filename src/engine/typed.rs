//! Transpile-then-execute engine for typed script.

use std::future;

use serde_json::{Map, Value};
use tracing::trace;

use crate::engine::error::EngineError;
use crate::engine::script::ScriptEngine;
use crate::engine::traits::{EngineFuture, ExecutionEngine, ExecutionRequest};
use crate::engine::transpile::{transpile, TranspileOptions};

/// Lowers typed source and runs it on a [`ScriptEngine`].
///
/// Cloning a `ScriptEngine` shares its context, so a typed engine built from a
/// clone sees the same bindings as plain `code` payloads.
#[derive(Debug, Clone)]
pub struct TypedScriptEngine {
    script: ScriptEngine,
    options: TranspileOptions,
}

impl TypedScriptEngine {
    /// Creates a typed engine on top of `script`.
    #[must_use]
    pub fn new(script: ScriptEngine) -> Self {
        Self {
            script,
            options: TranspileOptions::default(),
        }
    }

    /// Sets the transpile options.
    #[must_use]
    pub fn with_options(mut self, options: TranspileOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the transpile options.
    #[must_use]
    pub fn options(&self) -> TranspileOptions {
        self.options
    }
}

impl ExecutionEngine for TypedScriptEngine {
    fn execute(&self, mut request: ExecutionRequest) -> EngineFuture {
        match transpile(&request.code, self.options) {
            Ok(code) => {
                trace!(lowered = %code, "Transpiled typed script");
                request.code = code;
                self.script.execute(request)
            }
            Err(error) => Box::pin(future::ready(Err(error))),
        }
    }

    fn update_context(&self, values: Map<String, Value>) -> Result<(), EngineError> {
        self.script.update_context(values)
    }

    fn clear_context(&self) {
        self.script.clear_context();
    }

    fn name(&self) -> &'static str {
        "typed-script"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn runs_annotated_source() {
        let engine = TypedScriptEngine::new(ScriptEngine::new());
        let value = engine
            .execute(ExecutionRequest::new(
                "fn area(w: float, h: float) -> float { w * h }\nlet a: float = area(2.0, 3.5);\na",
            ))
            .await
            .unwrap();
        assert_eq!(value, json!(7.0));
    }

    #[tokio::test]
    async fn shares_context_with_plain_engine() {
        let script = ScriptEngine::new();
        let typed = TypedScriptEngine::new(script.clone());

        typed
            .execute(ExecutionRequest::new("let count: int = 41;"))
            .await
            .unwrap();
        let value = script.execute(ExecutionRequest::new("count + 1")).await.unwrap();
        assert_eq!(value, json!(42));

        typed.clear_context();
        assert!(script.execute(ExecutionRequest::new("count")).await.is_err());
    }

    #[tokio::test]
    async fn strict_mode_rejects_mistyped_values() {
        let engine = TypedScriptEngine::new(ScriptEngine::new())
            .with_options(TranspileOptions::default().with_strict(true));

        let error = engine
            .execute(ExecutionRequest::new("let n: int = \"five\";"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("n: expected int, found string"));

        let error = engine
            .execute(ExecutionRequest::new("fn inc(x: int) { x + 1 }\ninc(1.5)"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("x: expected int"));
    }

    #[tokio::test]
    async fn transpile_errors_reject_without_running() {
        let engine = TypedScriptEngine::new(ScriptEngine::new())
            .with_options(TranspileOptions::default().with_no_implicit_any(true));

        let error = engine
            .execute(ExecutionRequest::new("let side_effect = 1;"))
            .await
            .unwrap_err();
        assert!(error.is_transpile());
        assert!(engine.script.bindings().is_empty());
    }
}
