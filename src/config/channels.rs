use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{base_url_env, optional_env, parse_optional_env};
use crate::error::ConfigError;

const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

/// Channel configurations.
#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    pub telegram: TelegramConfig,
    pub repl: ReplConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot credential. Only required when the Telegram channel is started.
    pub bot_token: Option<SecretString>,
    pub api_base_url: String,
    /// Telegram owner user ID. When set, the bot only responds to this user.
    pub owner_id: Option<i64>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
}

impl TelegramConfig {
    /// The bot token, or a startup error naming the missing variable.
    pub fn require_token(&self) -> Result<&SecretString, ConfigError> {
        self.bot_token
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("BOT_TOKEN".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Where attachments produced in the terminal are written.
    pub export_dir: PathBuf,
}

impl ChannelsConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let poll_timeout_secs: u64 =
            parse_optional_env("TELEGRAM_POLL_TIMEOUT_SECS", "a non-negative integer")?
                .unwrap_or(30);

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: optional_env("BOT_TOKEN")?.map(SecretString::from),
                api_base_url: base_url_env(
                    "TELEGRAM_API_BASE_URL",
                    DEFAULT_TELEGRAM_API_BASE_URL,
                )?,
                owner_id: parse_optional_env("TELEGRAM_OWNER_ID", "an integer")?,
                poll_timeout: Duration::from_secs(poll_timeout_secs),
            },
            repl: ReplConfig {
                export_dir: optional_env("REPL_EXPORT_DIR")?
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("exports")),
            },
        })
    }
}
