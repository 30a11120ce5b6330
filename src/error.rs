//! Error types for tokenscope.

use std::time::Duration;

use regex::Regex;

use crate::query::ExecutionState;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures of one remote query execution.
///
/// This is the result type of the execution poller: the caller matches on
/// the variant to pick the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Non-success HTTP status, connectivity failure, or malformed payload.
    #[error("Query engine request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The execution reached FAILED or CANCELLED.
    #[error("Query failed ({state}): {detail}")]
    Failed {
        state: ExecutionState,
        detail: String,
    },

    /// No terminal state was observed within the budget.
    #[error("Query did not finish in time (waited {elapsed:?} of {max_wait:?})")]
    Timeout {
        elapsed: Duration,
        max_wait: Duration,
    },

    /// The poll task panicked or was cancelled by the runtime.
    #[error("Query worker stopped unexpectedly: {reason}")]
    Worker { reason: String },
}

impl QueryError {
    pub(crate) fn transport(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            reason: redact_sensitive_detail(&reason.to_string()),
        }
    }
}

/// Poll loop settings that cannot drive a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PollSettingsError {
    #[error("poll interval must be > 0")]
    ZeroInterval,
}

/// User input that failed a format check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("contract address must be 32-44 characters, got {length}")]
    InvalidAddress { length: usize },

    #[error("timestamp '{value}' does not match YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { value: String },
}

/// Result formatting errors.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("row {row} has columns [{found}], expected [{expected}]")]
    HeterogeneousColumns {
        row: usize,
        expected: String,
        found: String,
    },

    #[error("{rows} row(s) have no columns to export")]
    NoColumns { rows: usize },

    #[error("CSV export failed: {0}")]
    Csv(String),
}

impl From<csv::Error> for FormatError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Strip credentials from error text before it reaches logs or users.
pub fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|api[_\-]?key|secret|password)\b(\s*[:=]\s*)([^,\s]+)",
            "$1$2[REDACTED]",
        ),
        (r"(?i)/bot[0-9]+:[a-z0-9_\-]+", "/bot[REDACTED]"),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}
