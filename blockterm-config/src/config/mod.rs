//! The `Config` struct and its runtime helpers.

mod persistence;

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::LogLevel;

/// Smallest scrollback cap accepted by `validate`.
pub const MIN_SCROLLBACK_BYTES: usize = 1024;

/// Engine configuration, loaded from `~/.config/blockterm/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Shell to spawn. May include arguments (`"zsh -f"`); parsed with
    /// shell-word rules. Falls back to `$SHELL`, then `/bin/sh`.
    #[serde(default)]
    pub shell: Option<String>,

    /// Extra arguments appended after those in `shell`.
    #[serde(default)]
    pub shell_args: Option<Vec<String>>,

    /// Start shells as login shells (`-l`). Ignored when arguments are given.
    #[serde(default = "crate::defaults::login_shell")]
    pub login_shell: bool,

    /// Extra environment variables for every spawned shell.
    #[serde(default)]
    pub shell_env: Option<HashMap<String, String>>,

    /// Initial working directory for new tabs. `~` expands to home.
    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default = "crate::defaults::cols")]
    pub cols: u16,

    #[serde(default = "crate::defaults::rows")]
    pub rows: u16,

    /// Per-session scrollback cap in bytes. Oldest bytes are evicted first.
    #[serde(default = "crate::defaults::scrollback_bytes")]
    pub scrollback_bytes: usize,

    /// Number of blocks retained per session.
    #[serde(default = "crate::defaults::max_blocks")]
    pub max_blocks: usize,

    /// Grace period between the hangup signal and the forced kill.
    #[serde(default = "crate::defaults::kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Override for the saved session file.
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Override for the journal log file.
    #[serde(default)]
    pub journal_file: Option<PathBuf>,

    /// Source blockterm's prompt hooks into bash, zsh and fish so they
    /// report command blocks.
    #[serde(default = "crate::defaults::shell_integration")]
    pub shell_integration: bool,

    /// Restore the last saved session on startup.
    #[serde(default = "crate::defaults::restore_session")]
    pub restore_session: bool,

    /// Skip saving the session on exit.
    #[serde(default = "crate::defaults::bool_false")]
    pub skip_session_save: bool,

    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: None,
            login_shell: crate::defaults::login_shell(),
            shell_env: None,
            working_directory: None,
            cols: crate::defaults::cols(),
            rows: crate::defaults::rows(),
            scrollback_bytes: crate::defaults::scrollback_bytes(),
            max_blocks: crate::defaults::max_blocks(),
            kill_grace_ms: crate::defaults::kill_grace_ms(),
            session_file: None,
            journal_file: None,
            shell_integration: crate::defaults::shell_integration(),
            restore_session: crate::defaults::restore_session(),
            skip_session_save: false,
            log_level: LogLevel::default(),
        }
    }
}

/// A resolved shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Config {
    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Validation(format!(
                "cols and rows must be > 0 (got {}x{})",
                self.cols, self.rows
            )));
        }
        if self.scrollback_bytes < MIN_SCROLLBACK_BYTES {
            return Err(ConfigError::Validation(format!(
                "scrollback_bytes must be at least {MIN_SCROLLBACK_BYTES} (got {})",
                self.scrollback_bytes
            )));
        }
        if self.max_blocks == 0 {
            return Err(ConfigError::Validation(
                "max_blocks must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the shell program and its arguments.
    pub fn shell_command(&self) -> Result<ShellCommand, ConfigError> {
        let mut words = match self.shell.as_deref().map(str::trim) {
            Some(shell) if !shell.is_empty() => shell_words::split(shell).map_err(|e| {
                ConfigError::Validation(format!("shell {shell:?} is not valid shell syntax: {e}"))
            })?,
            _ => vec![std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())],
        };

        if words.is_empty() {
            return Err(ConfigError::Validation("shell command is empty".to_string()));
        }
        let program = words.remove(0);
        let mut args = words;
        if let Some(extra) = &self.shell_args {
            args.extend(extra.iter().cloned());
        }

        if self.login_shell && args.is_empty() {
            args.push("-l".to_string());
        }

        Ok(ShellCommand { program, args })
    }

    /// Working directory for new tabs with `~` expanded.
    pub fn effective_working_directory(&self) -> Option<PathBuf> {
        let dir = self.working_directory.as_deref()?.trim();
        if dir.is_empty() {
            return None;
        }
        if dir == "~" {
            return dirs::home_dir();
        }
        if let Some(rest) = dir.strip_prefix("~/") {
            return dirs::home_dir().map(|home| home.join(rest));
        }
        Some(PathBuf::from(dir))
    }

    /// Path of the saved-session file (config override or XDG default).
    pub fn effective_session_path(&self) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("last_session.yaml"))
    }

    /// Path of the journal log (config override or the platform data dir).
    pub fn effective_journal_path(&self) -> PathBuf {
        if let Some(path) = &self.journal_file {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("blockterm"))
            .unwrap_or_else(Self::config_dir)
            .join("journal.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_are_rejected() {
        let config = Config {
            cols: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_tiny_scrollback_is_rejected() {
        let config = Config {
            scrollback_bytes: 16,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shell_command_splits_configured_shell() {
        let config = Config {
            shell: Some("/bin/zsh -f".to_string()),
            shell_args: Some(vec!["-i".to_string()]),
            ..Config::default()
        };
        let cmd = config.shell_command().unwrap();
        assert_eq!(cmd.program, "/bin/zsh");
        assert_eq!(cmd.args, vec!["-f".to_string(), "-i".to_string()]);
    }

    #[test]
    fn test_login_flag_only_without_explicit_args() {
        let config = Config {
            shell: Some("/bin/bash".to_string()),
            ..Config::default()
        };
        assert_eq!(config.shell_command().unwrap().args, vec!["-l".to_string()]);

        let config = Config {
            shell: Some("/bin/bash".to_string()),
            login_shell: false,
            ..Config::default()
        };
        assert!(config.shell_command().unwrap().args.is_empty());
    }

    #[test]
    fn test_unbalanced_quotes_are_a_validation_error() {
        let config = Config {
            shell: Some("/bin/sh 'oops".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            config.shell_command(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_shell_without_words_is_a_validation_error() {
        let config = Config {
            shell: Some("# zsh".to_string()),
            ..Config::default()
        };
        match config.shell_command() {
            Err(ConfigError::Validation(msg)) => assert_eq!(msg, "shell command is empty"),
            other => panic!("expected a validation error, got {other:?}"),
        }

        // Whitespace only falls back to $SHELL or /bin/sh.
        let config = Config {
            shell: Some("  \t".to_string()),
            ..Config::default()
        };
        assert!(!config.shell_command().unwrap().program.is_empty());
    }

    #[test]
    fn test_tilde_working_directory_expands() {
        let config = Config {
            working_directory: Some("~/projects".to_string()),
            ..Config::default()
        };
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                config.effective_working_directory(),
                Some(home.join("projects"))
            );
        }
    }

    #[test]
    fn test_explicit_paths_override_defaults() {
        let config = Config {
            session_file: Some(PathBuf::from("/tmp/s.yaml")),
            journal_file: Some(PathBuf::from("/tmp/j.jsonl")),
            ..Config::default()
        };
        assert_eq!(config.effective_session_path(), PathBuf::from("/tmp/s.yaml"));
        assert_eq!(config.effective_journal_path(), PathBuf::from("/tmp/j.jsonl"));
    }
}
