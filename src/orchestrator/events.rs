//! Events emitted by the streaming loop.

use serde::{Deserialize, Serialize};

use crate::messages::Invocation;
use crate::types::InvocationId;

/// One step of a streamed run.
///
/// Serialises as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A provider call is starting
    Thinking,
    /// Another provider call follows executed code
    Iteration {
        /// 1-based number of the iteration that is starting
        iteration: usize,
    },
    /// A text delta arrived
    Text {
        /// The new text
        delta: String,
        /// All text of the current reply so far
        accumulated: String,
    },
    /// A closed invocation block was found
    CodeFound {
        /// The invocation, not yet executed
        invocation: Invocation,
    },
    /// The invocation is about to run
    CodeExecuting {
        /// Invocation id
        id: InvocationId,
    },
    /// The invocation finished
    CodeResult {
        /// Invocation id
        id: InvocationId,
        /// Raw response
        result: String,
        /// False if the response is a failure
        success: bool,
    },
    /// The run finished
    Complete {
        /// The accumulated output
        final_response: String,
        /// Number of provider calls made
        iterations: usize,
    },
    /// The run failed; no events follow
    Error {
        /// What went wrong
        message: String,
    },
}

impl StreamEvent {
    /// Creates an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for events that end the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Returns the snake_case event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Iteration { .. } => "iteration",
            Self::Text { .. } => "text",
            Self::CodeFound { .. } => "code_found",
            Self::CodeExecuting { .. } => "code_executing",
            Self::CodeResult { .. } => "code_result",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}
