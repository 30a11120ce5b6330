//! Command line interface.

mod doctor;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::channels::{Channel, ReplChannel, TelegramChannel};
use crate::config::Config;
use crate::lookup::DexScreenerLookup;
use crate::query::{DuneClient, ExecutionPoller};
use crate::session::{SessionMachine, SessionSettings};

pub use self::doctor::run_doctor_command;

#[derive(Parser, Debug)]
#[command(
    name = "tokenscope",
    version,
    about = "Token trader analytics over chat, backed by a remote query engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log output format (`pretty` or `json`).
    #[arg(long, global = true, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the Telegram bot (default).
    Run,
    /// Drive the same flows from this terminal.
    Repl,
    /// Check configuration and service reachability.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

/// Wire the query client, poller and lookup to `channel`.
pub fn build_machine(config: &Config, channel: Arc<dyn Channel>) -> anyhow::Result<Arc<SessionMachine>> {
    let engine = Arc::new(DuneClient::new(&config.query)?);
    let poller = Arc::new(ExecutionPoller::new(engine, config.query.poll));
    let lookup = Arc::new(DexScreenerLookup::new(&config.lookup)?);
    Ok(Arc::new(SessionMachine::new(
        channel,
        poller,
        lookup,
        SessionSettings::from_config(config),
    )))
}

/// Serve `channel` until its event stream ends or Ctrl+C.
async fn serve(config: &Config, channel: Arc<dyn Channel>) -> anyhow::Result<()> {
    let machine = build_machine(config, Arc::clone(&channel))?;
    let events = channel.start().await?;

    tokio::select! {
        _ = machine.serve(events) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown requested");
        }
    }
    Ok(())
}

pub async fn run_bot(config: &Config) -> anyhow::Result<()> {
    let channel = TelegramChannel::new(&config.channels.telegram)?;
    tracing::info!(
        max_wait_secs = config.query.poll.max_wait().as_secs(),
        poll_interval_secs = config.query.poll.poll_interval().as_secs(),
        "Bot running, send /start"
    );
    serve(config, Arc::new(channel)).await
}

pub async fn run_repl(config: &Config) -> anyhow::Result<()> {
    let channel = ReplChannel::new(&config.channels.repl);
    serve(config, Arc::new(channel)).await
}
