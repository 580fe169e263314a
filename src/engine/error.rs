//! Engine error types.
//!
//! An `EngineError` never escapes the loop: the orchestrator renders it into
//! an `"Error: ..."` tool result so the model can correct itself.

use std::fmt;
use std::time::Duration;

use crate::messages::InvocationFormat;

/// Errors that can occur while executing a payload.
///
/// The kind is boxed to keep `Result<Value, EngineError>` small.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    kind: Box<EngineErrorKind>,
}

/// Specific engine error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The payload raised an error or the process exited unsuccessfully
    ExecutionFailed {
        /// Engine that ran the payload
        engine: String,
        /// What went wrong
        reason: String,
    },
    /// The execution budget was exhausted
    Timeout {
        /// Engine that ran the payload
        engine: String,
        /// Budget that was exceeded
        duration: Duration,
    },
    /// Execution was aborted through the cancellation token
    Cancelled {
        /// Engine that ran the payload
        engine: String,
    },
    /// The typed source could not be lowered to executable script
    Transpile {
        /// 0-based line of the offending token
        line: usize,
        /// What was wrong
        reason: String,
    },
    /// A context value could not be stored
    Context {
        /// Context key
        key: String,
        /// Why it was rejected
        reason: String,
    },
    /// No engine is registered for a format
    NotConfigured {
        /// Format without an engine
        format: InvocationFormat,
    },
}

impl EngineError {
    /// Creates a new EngineError with the given kind.
    #[must_use]
    pub fn new(kind: EngineErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    /// Returns a reference to the error kind.
    #[must_use]
    pub fn kind(&self) -> &EngineErrorKind {
        &self.kind
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn execution_failed(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::ExecutionFailed {
            engine: engine.into(),
            reason: reason.into(),
        })
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(engine: impl Into<String>, duration: Duration) -> Self {
        Self::new(EngineErrorKind::Timeout {
            engine: engine.into(),
            duration,
        })
    }

    /// Creates a cancelled error.
    #[must_use]
    pub fn cancelled(engine: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Cancelled {
            engine: engine.into(),
        })
    }

    /// Creates a transpile error.
    #[must_use]
    pub fn transpile(line: usize, reason: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Transpile {
            line,
            reason: reason.into(),
        })
    }

    /// Creates a context error.
    #[must_use]
    pub fn context(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Context {
            key: key.into(),
            reason: reason.into(),
        })
    }

    /// Creates a not configured error.
    #[must_use]
    pub fn not_configured(format: InvocationFormat) -> Self {
        Self::new(EngineErrorKind::NotConfigured { format })
    }

    /// Returns true if the execution budget ran out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(*self.kind, EngineErrorKind::Timeout { .. })
    }

    /// Returns true if execution was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.kind, EngineErrorKind::Cancelled { .. })
    }

    /// Returns true if the typed source failed to transpile.
    #[must_use]
    pub fn is_transpile(&self) -> bool {
        matches!(*self.kind, EngineErrorKind::Transpile { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            EngineErrorKind::ExecutionFailed { engine, reason } => {
                write!(f, "{engine} execution failed: {reason}")
            }
            EngineErrorKind::Timeout { engine, duration } => {
                write!(
                    f,
                    "{engine} execution exceeded its budget of {duration:?}; simplify the code or split it into smaller steps"
                )
            }
            EngineErrorKind::Cancelled { engine } => {
                write!(f, "{engine} execution was cancelled")
            }
            EngineErrorKind::Transpile { line, reason } => {
                write!(f, "type error on line {}: {reason}", line + 1)
            }
            EngineErrorKind::Context { key, reason } => {
                write!(f, "cannot set context value '{key}': {reason}")
            }
            EngineErrorKind::NotConfigured { format } => {
                write!(
                    f,
                    "no engine is configured for '{format}' payloads; register one on the engine registry"
                )
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let error = EngineError::execution_failed("script", "undefined variable 'x'");
        assert_eq!(
            error.to_string(),
            "script execution failed: undefined variable 'x'"
        );

        let error = EngineError::transpile(0, "expected type after ':'");
        assert!(error.to_string().starts_with("type error on line 1"));

        let error = EngineError::not_configured(InvocationFormat::Terminal);
        assert!(error.to_string().contains("'terminal'"));
    }

    #[test]
    fn predicates() {
        assert!(EngineError::timeout("script", Duration::from_secs(1)).is_timeout());
        assert!(EngineError::cancelled("terminal").is_cancelled());
        assert!(EngineError::transpile(2, "x").is_transpile());
        assert!(!EngineError::cancelled("terminal").is_timeout());
    }

    #[test]
    fn kind_is_accessible() {
        let error = EngineError::context("user", "unsupported value");
        assert!(matches!(error.kind(), EngineErrorKind::Context { key, .. } if key == "user"));
    }
}
