//! Log output setup.
//!
//! Logs go to stderr so that a run's output on stdout stays clean.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// The `[logging]` configuration section.
///
/// # Example
///
/// ```rust
/// use codeloop::logging::{LogLevel, LoggingConfig};
///
/// let config = LoggingConfig::new().with_level(LogLevel::Debug);
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether logging is enabled.
    pub enabled: bool,
    /// Level filter used when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Emit ANSI colours.
    pub ansi: bool,
}

impl LoggingConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disabled configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Sets the level filter.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Enables or disables ANSI colours.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::default(),
            ansi: true,
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose
    Trace,
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warn; the default, so a CLI run only shows degraded paths
    #[default]
    Warn,
    /// Least verbose
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingError {
    /// The specific error that occurred.
    pub kind: LoggingErrorKind,
}

/// Specific logging error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingErrorKind {
    /// `RUST_LOG` is set but cannot be parsed.
    InvalidFilter {
        /// The parser's complaint.
        reason: String,
    },
    /// Subscriber initialization failed.
    SubscriberInitFailed {
        /// The reason for failure.
        reason: String,
    },
}

impl LoggingError {
    /// Creates a new LoggingError with the given kind.
    #[must_use]
    pub fn new(kind: LoggingErrorKind) -> Self {
        Self { kind }
    }

    /// Creates an error for an unparsable filter.
    #[must_use]
    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        Self::new(LoggingErrorKind::InvalidFilter {
            reason: reason.into(),
        })
    }

    /// Creates an error for subscriber initialization failure.
    #[must_use]
    pub fn subscriber_init_failed(reason: impl Into<String>) -> Self {
        Self::new(LoggingErrorKind::SubscriberInitFailed {
            reason: reason.into(),
        })
    }

    /// Returns true if a global subscriber could not be installed.
    #[must_use]
    pub fn is_subscriber_init_failed(&self) -> bool {
        matches!(self.kind, LoggingErrorKind::SubscriberInitFailed { .. })
    }
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LoggingErrorKind::InvalidFilter { reason } => {
                write!(f, "invalid RUST_LOG filter: {}; unset it or fix the directive", reason)
            }
            LoggingErrorKind::SubscriberInitFailed { reason } => {
                write!(
                    f,
                    "failed to initialize tracing subscriber: {}; \
                     a subscriber may already be set",
                    reason
                )
            }
        }
    }
}

impl std::error::Error for LoggingError {}

/// Builds the filter: `RUST_LOG` if set, the configured level otherwise.
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).map_err(|e| LoggingError::invalid_filter(e.to_string()))
        }
        _ => Ok(EnvFilter::new(config.level.as_str())),
    }
}

/// Installs the global stderr subscriber.
///
/// Returns `Ok(false)` without installing anything when logging is disabled.
///
/// # Errors
///
/// Returns an error if `RUST_LOG` is malformed or a global subscriber is
/// already installed.
///
/// # Example
///
/// ```rust,ignore
/// use codeloop::logging::{init_logging, LoggingConfig};
///
/// init_logging(&LoggingConfig::default())?;
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    if !config.enabled {
        return Ok(false);
    }

    let filter = build_filter(config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_target(false),
        )
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::subscriber_init_failed(e.to_string()))?;

    Ok(true)
}
