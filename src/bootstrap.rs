//! Bootstrap helpers for tokenscope.
//!
//! Env files are read before configuration resolves, and the tracing
//! subscriber is installed before anything logs.
//!
//! File: `~/.tokenscope/.env` (standard dotenvy format)

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Path to the tokenscope-specific `.env` file: `~/.tokenscope/.env`.
pub fn tokenscope_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tokenscope")
        .join(".env")
}

/// Load env vars from `~/.tokenscope/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that `./.env` takes priority.
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.tokenscope/.env`
pub fn load_tokenscope_env() {
    let path = tokenscope_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG` (default `info`). Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_lives_under_home_dir() {
        let path = tokenscope_env_path();
        assert!(path.ends_with(".env"));
        assert!(path.to_string_lossy().contains(".tokenscope"));
    }

    #[test]
    fn log_format_defaults_to_pretty() {
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("compact")), LogFormat::Pretty);
    }
}
