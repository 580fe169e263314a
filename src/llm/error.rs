//! Provider error types.
//!
//! A provider error aborts the current iteration. The orchestrator returns any
//! text it already accumulated and only propagates the error when there is none.

use std::fmt;
use std::time::Duration;

/// Errors that can occur while talking to a model backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LLMError {
    /// The specific error that occurred
    pub kind: LLMErrorKind,
}

/// Specific provider error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LLMErrorKind {
    /// The request never reached the backend or the connection dropped
    Network {
        /// Description of the network error
        message: String,
    },
    /// The backend asked us to slow down
    RateLimited {
        /// Time to wait before retrying
        retry_after: Duration,
    },
    /// The backend returned an error response
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the backend
        message: String,
        /// Error type from the backend, if it sent one
        error_type: Option<String>,
    },
    /// Credentials were rejected
    AuthenticationFailed {
        /// Reason for the rejection
        reason: String,
    },
    /// The backend rejected the request parameters
    InvalidRequest {
        /// Description of what was invalid
        reason: String,
    },
    /// A streamed response broke off or carried an error chunk
    StreamError {
        /// Description of the streaming error
        message: String,
    },
    /// A response body could not be decoded
    ParseError {
        /// Description of the parse error
        message: String,
    },
    /// The provider was configured incorrectly
    InvalidConfig {
        /// The configuration field that was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },
    /// The request exceeded its timeout
    Timeout {
        /// The timeout that was exceeded
        duration: Duration,
    },
}

impl LLMError {
    /// Creates a new LLMError with the given kind.
    #[must_use]
    pub fn new(kind: LLMErrorKind) -> Self {
        Self { kind }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LLMErrorKind::Network {
            message: message.into(),
        })
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::new(LLMErrorKind::RateLimited { retry_after })
    }

    /// Creates an API error.
    #[must_use]
    pub fn api_error(
        status_code: u16,
        message: impl Into<String>,
        error_type: Option<String>,
    ) -> Self {
        Self::new(LLMErrorKind::ApiError {
            status_code,
            message: message.into(),
            error_type,
        })
    }

    /// Creates an authentication failed error.
    #[must_use]
    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Self::new(LLMErrorKind::AuthenticationFailed {
            reason: reason.into(),
        })
    }

    /// Creates an invalid request error.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(LLMErrorKind::InvalidRequest {
            reason: reason.into(),
        })
    }

    /// Creates a stream error.
    #[must_use]
    pub fn stream_error(message: impl Into<String>) -> Self {
        Self::new(LLMErrorKind::StreamError {
            message: message.into(),
        })
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(LLMErrorKind::ParseError {
            message: message.into(),
        })
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(LLMErrorKind::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::new(LLMErrorKind::Timeout { duration })
    }

    /// Maps a transport error, recognizing timeouts.
    #[must_use]
    pub fn from_transport(error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::timeout(timeout)
        } else {
            Self::network(error.to_string())
        }
    }

    /// Returns true if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            LLMErrorKind::Network { .. }
                | LLMErrorKind::RateLimited { .. }
                | LLMErrorKind::Timeout { .. }
                | LLMErrorKind::ApiError {
                    status_code: 500..=599,
                    ..
                }
        )
    }

    /// Returns true if the request exceeded its timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, LLMErrorKind::Timeout { .. })
    }

    /// Returns true if the provider was configured incorrectly.
    #[must_use]
    pub fn is_invalid_config(&self) -> bool {
        matches!(self.kind, LLMErrorKind::InvalidConfig { .. })
    }

    /// Returns the retry-after duration if this is a rate limit error.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            LLMErrorKind::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for LLMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LLMErrorKind::Network { message } => {
                write!(
                    f,
                    "network error talking to the model backend: {message}; check connectivity and base_url"
                )
            }
            LLMErrorKind::RateLimited { retry_after } => {
                write!(
                    f,
                    "rate limit exceeded; retry after {} seconds",
                    retry_after.as_secs()
                )
            }
            LLMErrorKind::ApiError {
                status_code,
                message,
                error_type: Some(error_type),
            } => write!(f, "API error (HTTP {status_code}): {message} (type: {error_type})"),
            LLMErrorKind::ApiError {
                status_code,
                message,
                error_type: None,
            } => write!(f, "API error (HTTP {status_code}): {message}"),
            LLMErrorKind::AuthenticationFailed { reason } => {
                write!(f, "authentication failed: {reason}; verify the API key")
            }
            LLMErrorKind::InvalidRequest { reason } => {
                write!(f, "invalid request: {reason}; check model and options")
            }
            LLMErrorKind::StreamError { message } => {
                write!(f, "streaming error: {message}")
            }
            LLMErrorKind::ParseError { message } => {
                write!(f, "failed to parse backend response: {message}")
            }
            LLMErrorKind::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for '{field}': {reason}")
            }
            LLMErrorKind::Timeout { duration } => {
                write!(f, "request timed out after {} seconds", duration.as_secs())
            }
        }
    }
}

impl std::error::Error for LLMError {}
