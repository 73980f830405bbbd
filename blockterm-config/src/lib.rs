//! Configuration system for the blockterm session engine.
//!
//! This crate provides configuration loading, saving, validation and default
//! values: shell selection, terminal dimensions, scrollback and block limits,
//! kill grace period, persistence paths and log level.

pub mod config;
pub mod defaults;
mod error;
mod types;

pub use config::{Config, MIN_SCROLLBACK_BYTES, ShellCommand};
pub use error::ConfigError;
pub use types::LogLevel;
