//! Command-line interface for blockterm.
//!
//! Argument parsing and the one-shot subcommands. The interactive `run`
//! loop lives in [`crate::app`].

mod blocks;
mod journal;
mod session;

use blockterm_config::{Config, LogLevel};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// blockterm - terminal session engine with command blocks and undoable file edits
#[derive(Parser)]
#[command(name = "blockterm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to use instead of ~/.config/blockterm/config.yaml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set debug log level (overrides config and BLOCKTERM_LOG)
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,
}

/// Log level argument for CLI
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Off => LogLevel::Off,
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a shell, piping stdin into it and its output to stdout (default)
    Run(RunArgs),

    /// Run one command with shell integration markers and print its blocks
    Blocks {
        /// Command line to run
        #[arg(short = 'c', long = "command", value_name = "COMMAND")]
        command: String,

        /// Shell that interprets the command
        #[arg(long, default_value = "/bin/sh")]
        shell: String,
    },

    /// Inspect and replay the file-edit journal
    Journal {
        #[command(subcommand)]
        action: JournalCommand,
    },

    /// Inspect the saved session
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Shell to start (overrides config)
    #[arg(long, value_name = "PATH")]
    pub shell: Option<String>,

    /// Working directory (overrides config)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Do not restore the saved session
    #[arg(long)]
    pub no_restore: bool,

    /// Do not save the session on exit
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum JournalCommand {
    /// List journal entries
    List,

    /// Apply a file operation and record it
    Apply {
        /// File to change
        path: PathBuf,

        /// File holding the new content (or the diff, with --diff)
        content: PathBuf,

        /// Treat the content file as a unified diff
        #[arg(long)]
        diff: bool,
    },

    /// Undo an applied entry
    Undo { id: u64 },

    /// Re-apply an undone entry
    Redo { id: u64 },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// Print a summary of the saved session
    Show,

    /// Delete the saved session
    Clear,
}

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Run the parsed command line. Returns the process exit code.
pub async fn execute(cli: Cli, config: Config) -> anyhow::Result<i32> {
    match cli.command {
        None => crate::app::run(config, RunArgs::default()).await,
        Some(Commands::Run(args)) => crate::app::run(config, args).await,
        Some(Commands::Blocks { command, shell }) => blocks::run(&config, &shell, &command).await,
        Some(Commands::Journal { action }) => journal::run(&config, action).await,
        Some(Commands::Session { action }) => session::run(&config, action),
    }
}
