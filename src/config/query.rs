use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{base_url_env, optional_env, parse_optional_env, required_env};
use crate::error::ConfigError;
use crate::query::{PollSettings, QueryId};

const DEFAULT_API_BASE_URL: &str = "https://api.dune.com/api/v1";
const DEFAULT_LOOKUP_BASE_URL: &str = "https://api.dexscreener.com";

/// Remote query engine configuration.
#[derive(Debug, Clone)]
pub struct QueryEngineConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub top_traders_query: QueryId,
    pub trades_query: QueryId,
    pub poll: PollSettings,
    /// Per-request timeout for submit/status/results calls.
    pub http_timeout: Duration,
}

impl QueryEngineConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let api_key = SecretString::from(required_env("DUNE_API_KEY")?);
        let top_traders_query = resolve_query_id("TOP_TRADERS_QUERY")?;
        let trades_query = resolve_query_id("TRADES_QUERY")?;

        let max_wait_secs: u64 =
            parse_optional_env("QUERY_MAX_WAIT_SECS", "a non-negative integer")?.unwrap_or(30 * 60);
        let poll_interval_secs: u64 =
            parse_optional_env("QUERY_POLL_INTERVAL_SECS", "a positive integer")?.unwrap_or(5);
        let poll = PollSettings::new(
            Duration::from_secs(max_wait_secs),
            Duration::from_secs(poll_interval_secs),
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "QUERY_POLL_INTERVAL_SECS".to_string(),
            message: e.to_string(),
        })?;

        let http_timeout_secs: u64 =
            parse_optional_env("QUERY_HTTP_TIMEOUT_SECS", "a positive integer")?.unwrap_or(30);
        if http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "QUERY_HTTP_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            base_url: base_url_env("DUNE_API_BASE_URL", DEFAULT_API_BASE_URL)?,
            api_key,
            top_traders_query,
            trades_query,
            poll,
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

fn resolve_query_id(key: &str) -> Result<QueryId, ConfigError> {
    let raw = optional_env(key)?.ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: "Set it to the numeric id of the saved query.".to_string(),
    })?;
    raw.parse::<u64>()
        .map(QueryId)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a numeric query id: {e}"),
        })
}

/// Token display-name lookup configuration.
#[derive(Debug, Clone)]
pub struct TokenLookupConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl TokenLookupConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let timeout_secs: u64 =
            parse_optional_env("TOKEN_LOOKUP_TIMEOUT_SECS", "a positive integer")?.unwrap_or(10);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TOKEN_LOOKUP_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            base_url: base_url_env("TOKEN_LOOKUP_BASE_URL", DEFAULT_LOOKUP_BASE_URL)?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Limits applied when rendering results into chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportConfig {
    /// Byte budget of one inline message.
    pub inline_text_max_bytes: usize,
    /// Rows rendered inline by the trades flow.
    pub trades_inline_row_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            inline_text_max_bytes: 4096,
            trades_inline_row_limit: 20,
        }
    }
}

impl ReportConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let inline_text_max_bytes =
            parse_optional_env("INLINE_TEXT_MAX_BYTES", "a positive integer")?
                .unwrap_or(defaults.inline_text_max_bytes);
        if inline_text_max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INLINE_TEXT_MAX_BYTES".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            inline_text_max_bytes,
            trades_inline_row_limit: parse_optional_env(
                "TRADES_INLINE_ROW_LIMIT",
                "a non-negative integer",
            )?
            .unwrap_or(defaults.trades_inline_row_limit),
        })
    }
}
