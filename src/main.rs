use clap::Parser;

use tokenscope::bootstrap::{LogFormat, init_tracing};
use tokenscope::cli::{Cli, Command, run_bot, run_doctor_command, run_repl};
use tokenscope::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env files before clap reads env-backed flags.
    let _ = dotenvy::dotenv();
    tokenscope::bootstrap::load_tokenscope_env();

    let cli = Cli::parse();
    init_tracing(LogFormat::parse(cli.log_format.as_deref()));

    match cli.command.unwrap_or(Command::Run) {
        Command::Doctor { strict } => run_doctor_command(strict).await,
        Command::Run => {
            let config = Config::from_env()?;
            run_bot(&config).await
        }
        Command::Repl => {
            let config = Config::from_env()?;
            run_repl(&config).await
        }
    }
}
