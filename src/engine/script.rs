//! Direct script execution on an embedded Rhai engine.
//!
//! The engine keeps one [`Scope`] for its whole life. Top-level `let`
//! bindings land in that scope, so later payloads see them. Function
//! definitions are local to the payload that declares them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rhai::{Dynamic, EvalAltResult, Scope};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::engine::error::EngineError;
use crate::engine::traits::{EngineFuture, ExecutionEngine, ExecutionLimits, ExecutionRequest};

const NAME: &str = "script";

/// The progress hook checks the budget every this many operations.
const PROGRESS_INTERVAL: u64 = 1024;

/// Per-call budget consulted by the progress hook.
#[derive(Debug, Default)]
struct Budget {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Budget {
    fn exhausted(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

struct Runtime {
    engine: rhai::Engine,
    scope: Mutex<Scope<'static>>,
    budget: Arc<Mutex<Budget>>,
    printed: Arc<Mutex<Vec<String>>>,
    limits: ExecutionLimits,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Executes Rhai script against a persistent context.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    runtime: Arc<Runtime>,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine {
    /// Creates an engine with the default execution budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ExecutionLimits::default())
    }

    /// Creates an engine with a custom execution budget.
    #[must_use]
    pub fn with_limits(limits: ExecutionLimits) -> Self {
        let budget = Arc::new(Mutex::new(Budget::default()));
        let printed = Arc::new(Mutex::new(Vec::new()));

        let mut engine = rhai::Engine::new();
        engine.set_max_operations(limits.max_operations.unwrap_or(0));

        let hook_budget = Arc::clone(&budget);
        engine.on_progress(move |ops: u64| {
            if ops % PROGRESS_INTERVAL != 0 {
                return None;
            }
            let budget = hook_budget.lock().unwrap_or_else(PoisonError::into_inner);
            budget.exhausted().then_some(Dynamic::UNIT)
        });

        let sink = Arc::clone(&printed);
        engine.on_print(move |line: &str| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_string());
        });

        Self {
            runtime: Arc::new(Runtime {
                engine,
                scope: Mutex::new(Scope::new()),
                budget,
                printed,
                limits,
            }),
        }
    }

    /// Returns the execution budget.
    #[must_use]
    pub fn limits(&self) -> ExecutionLimits {
        self.runtime.limits
    }

    /// Returns the names currently bound in the persistent context.
    #[must_use]
    pub fn bindings(&self) -> Vec<String> {
        let scope = self.runtime.scope.lock().unwrap_or_else(PoisonError::into_inner);
        scope.iter_raw().map(|(name, _, _)| name.to_string()).collect()
    }
}

impl Runtime {
    fn run(&self, request: &ExecutionRequest) -> Result<Value, EngineError> {
        let mut scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in &request.extension {
            bind(&mut scope, key, value)?;
        }

        {
            let mut budget = self.budget.lock().unwrap_or_else(PoisonError::into_inner);
            budget.deadline = self.limits.timeout.map(|timeout| Instant::now() + timeout);
            budget.cancel = Some(request.cancellation.clone());
        }
        self.printed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let outcome = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, &request.code);

        *self.budget.lock().unwrap_or_else(PoisonError::into_inner) = Budget::default();
        let printed = std::mem::take(&mut *self.printed.lock().unwrap_or_else(PoisonError::into_inner));

        match outcome {
            Ok(value) => Ok(to_json(value, printed)),
            Err(error) => Err(self.map_error(*error, &request.cancellation)),
        }
    }

    fn map_error(&self, error: EvalAltResult, cancel: &CancellationToken) -> EngineError {
        match error {
            EvalAltResult::ErrorTerminated(..) if cancel.is_cancelled() => {
                EngineError::cancelled(NAME)
            }
            EvalAltResult::ErrorTerminated(..) => {
                EngineError::timeout(NAME, self.limits.timeout.unwrap_or_default())
            }
            EvalAltResult::ErrorTooManyOperations(_) => EngineError::execution_failed(
                NAME,
                format!(
                    "operation limit of {} exceeded",
                    self.limits.max_operations.unwrap_or_default()
                ),
            ),
            EvalAltResult::ErrorRuntime(value, _) => {
                EngineError::execution_failed(NAME, value.to_string())
            }
            other => EngineError::execution_failed(NAME, other.to_string()),
        }
    }
}

fn bind(scope: &mut Scope<'static>, key: &str, value: &Value) -> Result<(), EngineError> {
    if key.trim().is_empty() {
        return Err(EngineError::context(key, "name cannot be empty"));
    }
    let dynamic =
        rhai::serde::to_dynamic(value).map_err(|e| EngineError::context(key, e.to_string()))?;
    scope.set_or_push(key.to_string(), dynamic);
    Ok(())
}

/// Converts a script result to JSON.
///
/// A unit result falls back to the captured `print` output.
fn to_json(value: Dynamic, printed: Vec<String>) -> Value {
    if value.is_unit() {
        return if printed.is_empty() {
            Value::Null
        } else {
            Value::String(printed.join("\n"))
        };
    }

    rhai::serde::from_dynamic::<Value>(&value).unwrap_or_else(|_| Value::String(value.to_string()))
}

impl ExecutionEngine for ScriptEngine {
    fn execute(&self, request: ExecutionRequest) -> EngineFuture {
        let runtime = Arc::clone(&self.runtime);

        Box::pin(async move {
            let cancel = request.cancellation.clone();
            if cancel.is_cancelled() {
                return Err(EngineError::cancelled(NAME));
            }

            trace!(code = %request.code, "Executing script");
            let task = tokio::task::spawn_blocking(move || runtime.run(&request));

            tokio::select! {
                joined = task => joined.map_err(|e| {
                    EngineError::execution_failed(NAME, format!("script task failed: {e}"))
                })?,
                () = cancel.cancelled() => {
                    debug!("Script execution cancelled");
                    Err(EngineError::cancelled(NAME))
                }
            }
        })
    }

    fn update_context(&self, values: Map<String, Value>) -> Result<(), EngineError> {
        let mut scope = self.runtime.scope.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in &values {
            bind(&mut scope, key, value)?;
        }
        Ok(())
    }

    fn clear_context(&self) {
        self.runtime
            .scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
