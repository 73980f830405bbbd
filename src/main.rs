use anyhow::Result;
use blockterm::cli::{self, Cli};
use blockterm_config::LogLevel;
use clap::Parser;
use std::time::Duration;
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    // Parse arguments first so --help/--version never touch config or logs.
    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    // CLI --log-level takes highest precedence, then BLOCKTERM_LOG, then config.
    let level = cli
        .log_level
        .map(LogLevel::from)
        .unwrap_or_else(|| blockterm::debug::resolve_level(config.log_level));
    blockterm::debug::init_log_bridge(level);

    log::info!("Starting blockterm {}", blockterm::VERSION);

    let runtime = Runtime::new()?;
    let result = runtime.block_on(cli::execute(cli, config));

    // Reader threads are plain threads; only blocking-pool tasks (a pending
    // kill or journal write) can still be running here.
    runtime.shutdown_timeout(Duration::from_secs(2));

    match result {
        Ok(0) => Ok(()),
        Ok(code) => {
            log::info!("Exiting with code {}", code);
            std::process::exit(code);
        }
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("blockterm: error: {e:#}");
            std::process::exit(1);
        }
    }
}
