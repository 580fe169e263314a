//! Core message type definitions.
//!
//! All types are plain data: `Clone + Debug + Serialize + Deserialize`.

use crate::types::InvocationId;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Conversation Messages
// =============================================================================

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: MessageRole,
    /// The content of the message
    pub content: String,
}

impl Message {
    /// Creates a message with an explicit role.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a new user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates a new assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Creates a new tool message.
    #[must_use]
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, content)
    }

    /// Creates a new system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
    /// Tool response
    Tool,
}

impl MessageRole {
    /// Returns the lowercase wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Invocations
// =============================================================================

/// The payload format of an invocation, selecting the engine that runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationFormat {
    /// Directly executable script source
    Code,
    /// Typed script source that is transpiled before execution
    TypedCode,
    /// A shell command line
    Terminal,
}

impl InvocationFormat {
    /// Returns the marker spelling of this format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::TypedCode => "typed-code",
            Self::Terminal => "terminal",
        }
    }

    /// Parses an execution format as written after `/do/<verb>/`.
    ///
    /// `terminal` is not accepted here: terminal invocations use their own verb.
    #[must_use]
    pub fn from_marker(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "typed-code" => Some(Self::TypedCode),
            _ => None,
        }
    }
}

impl fmt::Display for InvocationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool-use request embedded in model output.
///
/// `start_line..=end_line` is the 0-based, inclusive line range in the source
/// response, from the marker line through the closing fence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Identifier, unique within one response
    pub id: InvocationId,
    /// The verb from the marker (`exec`, `terminal`, ...)
    pub operation: String,
    /// Payload format
    pub format: InvocationFormat,
    /// Shell requested by a terminal invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Payload, verbatim
    pub request: String,
    /// Raw response once executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// First line of the marker+fence range
    pub start_line: usize,
    /// Last line of the marker+fence range (the closing fence)
    pub end_line: usize,
}

impl Invocation {
    /// Returns the number of source lines this invocation spans.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Returns true if `line` falls inside this invocation's range.
    #[must_use]
    pub fn contains_line(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    /// Returns a copy with line numbers shifted by `offset`.
    #[must_use]
    pub fn shifted(mut self, offset: usize) -> Self {
        self.start_line += offset;
        self.end_line += offset;
        self
    }

    /// Returns the response if it exists and is not a failure.
    #[must_use]
    pub fn successful_response(&self) -> Option<&str> {
        self.response
            .as_deref()
            .filter(|r| !r.trim().is_empty() && !r.starts_with(FAILURE_SENTINEL))
    }
}

/// Prefix marking a raw response as a failure.
pub const FAILURE_SENTINEL: &str = "Error:";

// =============================================================================
// Memory
// =============================================================================

/// An entry in conversation memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryEntry {
    /// A plain conversation message
    Message(Message),
    /// An executed invocation
    Invocation(Invocation),
}

impl MemoryEntry {
    /// Returns the role this entry plays in the conversation.
    #[must_use]
    pub fn role(&self) -> MessageRole {
        match self {
            Self::Message(message) => message.role,
            Self::Invocation(_) => MessageRole::Tool,
        }
    }
}

impl From<Message> for MemoryEntry {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Invocation> for MemoryEntry {
    fn from(invocation: Invocation) -> Self {
        Self::Invocation(invocation)
    }
}
