//! Parse error types.
//!
//! Parse errors are local: the scanner drops the offending candidate and keeps
//! going. They only surface to callers through [`parse_one`](super::InvocationParser::parse_one).

use std::fmt;

/// Errors that can occur while parsing a single invocation block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 0-based line the error refers to
    pub line: usize,
    /// The specific error that occurred
    pub kind: ParseErrorKind,
}

/// Specific parse error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The line does not match the marker grammar
    InvalidMarker {
        /// What was wrong with the marker
        reason: String,
    },
    /// The marker is not followed by a complete fenced block
    InvalidPayload {
        /// What was missing
        reason: String,
    },
}

impl ParseError {
    /// Creates a new ParseError with the given kind.
    #[must_use]
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }

    /// Creates an invalid marker error.
    #[must_use]
    pub fn invalid_marker(line: usize, reason: impl Into<String>) -> Self {
        Self::new(
            line,
            ParseErrorKind::InvalidMarker {
                reason: reason.into(),
            },
        )
    }

    /// Creates an invalid payload error.
    #[must_use]
    pub fn invalid_payload(line: usize, reason: impl Into<String>) -> Self {
        Self::new(
            line,
            ParseErrorKind::InvalidPayload {
                reason: reason.into(),
            },
        )
    }

    /// Returns true if the marker line itself was malformed.
    #[must_use]
    pub fn is_invalid_marker(&self) -> bool {
        matches!(self.kind, ParseErrorKind::InvalidMarker { .. })
    }

    /// Returns true if the fenced payload was missing or unterminated.
    #[must_use]
    pub fn is_invalid_payload(&self) -> bool {
        matches!(self.kind, ParseErrorKind::InvalidPayload { .. })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::InvalidMarker { reason } => {
                write!(f, "invalid marker on line {}: {}", self.line + 1, reason)
            }
            ParseErrorKind::InvalidPayload { reason } => {
                write!(f, "invalid payload after line {}: {}", self.line + 1, reason)
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_one_based_lines() {
        let error = ParseError::invalid_marker(0, "missing /do/ segment");
        let message = error.to_string();
        assert!(message.contains("line 1"));
        assert!(message.contains("/do/"));
    }

    #[test]
    fn predicates() {
        assert!(ParseError::invalid_marker(3, "x").is_invalid_marker());
        assert!(!ParseError::invalid_marker(3, "x").is_invalid_payload());
        assert!(ParseError::invalid_payload(3, "x").is_invalid_payload());
    }
}
