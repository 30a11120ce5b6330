//! Configuration for tokenscope.
//!
//! Everything comes from env vars, loaded once at startup. `./.env` and
//! `~/.tokenscope/.env` are read via dotenvy before resolution; explicit
//! env vars always win.

mod channels;
pub(crate) mod helpers;
mod query;

use crate::error::ConfigError;

pub use self::channels::{ChannelsConfig, ReplConfig, TelegramConfig};
pub use self::query::{QueryEngineConfig, ReportConfig, TokenLookupConfig};

/// Main configuration for the bot.
#[derive(Debug, Clone)]
pub struct Config {
    pub query: QueryEngineConfig,
    pub lookup: TokenLookupConfig,
    pub report: ReportConfig,
    pub channels: ChannelsConfig,
}

impl Config {
    /// Load `.env` files, then resolve configuration from the environment.
    ///
    /// Loads both `./.env` (higher priority) and `~/.tokenscope/.env`
    /// (lower priority); dotenvy never overwrites existing vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_tokenscope_env();
        Self::resolve()
    }

    /// Resolve configuration from the current process environment only.
    pub fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            query: QueryEngineConfig::resolve()?,
            lookup: TokenLookupConfig::resolve()?,
            report: ReportConfig::resolve()?,
            channels: ChannelsConfig::resolve()?,
        })
    }
}
