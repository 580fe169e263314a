//! Top-level error type for codeloop.
//!
//! Layer errors ([`ParseError`](crate::parser::ParseError),
//! [`EngineError`](crate::engine::EngineError), [`LLMError`]) live next to
//! the code that raises them. Parse and engine errors never escape a run:
//! they drop a candidate or become an `"Error: ..."` response. Only
//! construction problems, unrecoverable provider failures and cancellation
//! surface here.

use crate::llm::LLMError;
use std::fmt;

/// Errors returned by the orchestrator API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeloopError {
    /// The specific error that occurred
    pub kind: CodeloopErrorKind,
}

/// Specific top-level error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeloopErrorKind {
    /// Invalid setup detected while building an orchestrator or loading config
    Configuration {
        /// The setting that was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },
    /// The provider failed before any output was produced
    Provider(LLMError),
    /// The caller cancelled the run
    Cancelled,
}

impl CodeloopError {
    /// Creates a new CodeloopError with the given kind.
    #[must_use]
    pub fn new(kind: CodeloopErrorKind) -> Self {
        Self { kind }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(CodeloopErrorKind::Configuration {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(CodeloopErrorKind::Cancelled)
    }

    /// Returns true if this error indicates a configuration problem.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind, CodeloopErrorKind::Configuration { .. })
    }

    /// Returns true if this error came from the provider.
    #[must_use]
    pub fn is_provider(&self) -> bool {
        matches!(self.kind, CodeloopErrorKind::Provider(_))
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, CodeloopErrorKind::Cancelled)
    }

    /// Returns the provider error, if that is what this is.
    #[must_use]
    pub fn provider_error(&self) -> Option<&LLMError> {
        match &self.kind {
            CodeloopErrorKind::Provider(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for CodeloopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CodeloopErrorKind::Configuration { field, reason } => {
                write!(f, "configuration error for '{field}': {reason}")
            }
            CodeloopErrorKind::Provider(error) => write!(f, "provider error: {error}"),
            CodeloopErrorKind::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for CodeloopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            CodeloopErrorKind::Provider(error) => Some(error),
            CodeloopErrorKind::Configuration { .. } | CodeloopErrorKind::Cancelled => None,
        }
    }
}

impl From<LLMError> for CodeloopError {
    fn from(error: LLMError) -> Self {
        if let crate::llm::LLMErrorKind::InvalidConfig { field, reason } = &error.kind {
            return Self::configuration(field.clone(), reason.clone());
        }
        Self::new(CodeloopErrorKind::Provider(error))
    }
}
