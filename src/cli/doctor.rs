//! `tokenscope doctor` - configuration and reachability diagnostics.
//!
//! Prints the resolved configuration with credentials masked, then probes
//! the external services the bot depends on. Each check reports pass/fail
//! with actionable guidance on failures.

use std::path::Path;
use std::time::Duration;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::config::helpers::mask_secret;
use crate::error::redact_sensitive_detail;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(strict: bool) -> anyhow::Result<()> {
    println!("tokenscope doctor");
    println!("=================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    // ── Configuration ─────────────────────────────────────────

    let config = match Config::from_env() {
        Ok(config) => {
            check(
                "Configuration",
                CheckResult::Pass("all required settings present".to_string()),
                &mut passed,
                &mut failed,
            );
            config
        }
        Err(e) => {
            check(
                "Configuration",
                CheckResult::Fail(e.to_string()),
                &mut passed,
                &mut failed,
            );
            return summarize(passed, failed, strict);
        }
    };

    println!();
    for line in describe_config(&config) {
        println!("    {line}");
    }
    println!();

    check(
        "Telegram credential",
        check_bot_token(&config),
        &mut passed,
        &mut failed,
    );

    check(
        "Export directory",
        check_export_dir(&config.channels.repl.export_dir),
        &mut passed,
        &mut failed,
    );

    // ── External services ─────────────────────────────────────

    check(
        "Query engine reachability",
        probe_http_endpoint(
            "query engine",
            &config.query.base_url,
            Some((
                "x-dune-api-key",
                config.query.api_key.expose_secret().to_string(),
            )),
        )
        .await,
        &mut passed,
        &mut failed,
    );

    check(
        "Token lookup reachability",
        probe_http_endpoint("token lookup", &config.lookup.base_url, None).await,
        &mut passed,
        &mut failed,
    );

    summarize(passed, failed, strict)
}

fn summarize(passed: u32, failed: u32, strict: bool) -> anyhow::Result<()> {
    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 {
        println!("\n  Some checks failed. Fix them before running the bot.");
        if strict {
            anyhow::bail!("doctor strict mode failed with {failed} check(s)");
        }
    }

    Ok(())
}

// ── Individual checks ───────────────────────────────────────

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

/// Resolved settings as `KEY: value` lines, credentials masked.
fn describe_config(config: &Config) -> Vec<String> {
    let bot_token = config
        .channels
        .telegram
        .bot_token
        .as_ref()
        .map(|t| mask_secret(t.expose_secret()))
        .unwrap_or_else(|| "(not set)".to_string());

    vec![
        format!("BOT_TOKEN: {bot_token}"),
        format!(
            "DUNE_API_KEY: {}",
            mask_secret(config.query.api_key.expose_secret())
        ),
        format!("TOP_TRADERS_QUERY: {}", config.query.top_traders_query),
        format!("TRADES_QUERY: {}", config.query.trades_query),
        format!("DUNE_API_BASE_URL: {}", config.query.base_url),
        format!(
            "QUERY_MAX_WAIT_SECS: {}",
            config.query.poll.max_wait().as_secs()
        ),
        format!(
            "QUERY_POLL_INTERVAL_SECS: {}",
            config.query.poll.poll_interval().as_secs()
        ),
        format!("TOKEN_LOOKUP_BASE_URL: {}", config.lookup.base_url),
        format!(
            "INLINE_TEXT_MAX_BYTES: {}",
            config.report.inline_text_max_bytes
        ),
        format!(
            "TRADES_INLINE_ROW_LIMIT: {}",
            config.report.trades_inline_row_limit
        ),
        format!(
            "TELEGRAM_OWNER_ID: {}",
            config
                .channels
                .telegram
                .owner_id
                .map_or_else(|| "(anyone)".to_string(), |id| id.to_string())
        ),
    ]
}

fn check_bot_token(config: &Config) -> CheckResult {
    match config.channels.telegram.require_token() {
        Ok(token) if token.expose_secret().contains(':') => {
            CheckResult::Pass("BOT_TOKEN is set".to_string())
        }
        Ok(_) => CheckResult::Fail(
            "BOT_TOKEN does not look like a bot token (expected <id>:<secret>)".to_string(),
        ),
        Err(_) => CheckResult::Skip("BOT_TOKEN not set; only `tokenscope repl` will work".to_string()),
    }
}

fn check_export_dir(dir: &Path) -> CheckResult {
    if dir.is_dir() {
        match std::fs::metadata(dir) {
            Ok(meta) if meta.permissions().readonly() => {
                CheckResult::Fail(format!("{} is read-only", dir.display()))
            }
            Ok(_) => CheckResult::Pass(dir.display().to_string()),
            Err(e) => CheckResult::Fail(format!("{}: {e}", dir.display())),
        }
    } else if dir.exists() {
        CheckResult::Fail(format!("{} exists but is not a directory", dir.display()))
    } else {
        CheckResult::Skip(format!("{} will be created on first export", dir.display()))
    }
}

async fn probe_http_endpoint(
    label: &str,
    endpoint: &str,
    auth_header: Option<(&'static str, String)>,
) -> CheckResult {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return CheckResult::Fail(format!("{label} endpoint is empty"));
    }

    let url = match reqwest::Url::parse(endpoint) {
        Ok(url) => url,
        Err(e) => {
            return CheckResult::Fail(format!(
                "{label} endpoint URL is invalid ({}): {e}",
                redact_url_for_display(endpoint)
            ));
        }
    };

    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return CheckResult::Fail(format!("cannot construct HTTP client: {e}")),
    };

    let mut request = client.get(url.clone());
    if let Some((name, value)) = auth_header {
        request = request.header(name, value);
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_server_error() {
                CheckResult::Fail(format!(
                    "{label} reachable but unhealthy ({} at {})",
                    status,
                    redact_url_for_display(url.as_str())
                ))
            } else {
                CheckResult::Pass(format!(
                    "{} ({status})",
                    redact_url_for_display(url.as_str())
                ))
            }
        }
        Err(e) => CheckResult::Fail(format!(
            "{label} unreachable ({}): {}",
            redact_url_for_display(url.as_str()),
            redact_sensitive_detail(&e.to_string())
        )),
    }
}

fn redact_url_for_display(raw: &str) -> String {
    match reqwest::Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() {
                let _ = url.set_username("redacted");
            }
            if url.password().is_some() {
                let _ = url.set_password(Some("redacted"));
            }
            url.to_string()
        }
        Err(_) => "<invalid-url>".to_string(),
    }
}
