//! Spawn options, shell resolution and the child environment.

use crate::error::SpawnError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-session scrollback cap.
pub const DEFAULT_SCROLLBACK_BYTES: usize = 1024 * 1024;
/// Default number of retained blocks per session.
pub const DEFAULT_MAX_BLOCKS: usize = 1000;
/// Default delay between the hangup signal and the forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(750);

/// Everything needed to start one PTY session.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub shell: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    /// Overrides applied on top of the inherited environment.
    pub env: HashMap<String, String>,
    pub scrollback_bytes: usize,
    pub max_blocks: usize,
    pub kill_grace: Duration,
    /// Prior output to seed the scrollback with (restored sessions).
    pub history: Vec<u8>,
}

impl SpawnOptions {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            args: Vec::new(),
            working_dir: None,
            cols: 80,
            rows: 24,
            env: HashMap::new(),
            scrollback_bytes: DEFAULT_SCROLLBACK_BYTES,
            max_blocks: DEFAULT_MAX_BLOCKS,
            kill_grace: DEFAULT_KILL_GRACE,
            history: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn scrollback_bytes(mut self, bytes: usize) -> Self {
        self.scrollback_bytes = bytes;
        self
    }

    pub fn max_blocks(mut self, max: usize) -> Self {
        self.max_blocks = max;
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn history(mut self, history: Vec<u8>) -> Self {
        self.history = history;
        self
    }
}

/// Resolve `shell` to an executable file.
///
/// Names containing a path separator are checked as given; bare names are
/// looked up on `PATH`.
pub fn resolve_shell(shell: &str) -> Result<PathBuf, SpawnError> {
    if shell.trim().is_empty() {
        return Err(SpawnError::ShellNotFound(shell.to_string()));
    }

    let candidate = Path::new(shell);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        if !candidate.is_file() {
            return Err(SpawnError::ShellNotFound(shell.to_string()));
        }
        if !is_executable(candidate) {
            return Err(SpawnError::NotExecutable(candidate.to_path_buf()));
        }
        return Ok(candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(shell))
        .find(|full| full.is_file() && is_executable(full))
        .ok_or_else(|| SpawnError::ShellNotFound(shell.to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Check that `dir` is an existing directory.
pub fn validate_working_dir(dir: &Path) -> Result<(), SpawnError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(SpawnError::InvalidWorkingDirectory(dir.to_path_buf()))
    }
}

/// Environment variables set for every spawned shell, with `overrides` applied last.
pub fn build_shell_env(overrides: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("TERM".to_string(), "xterm-256color".to_string());
    env.insert("COLORTERM".to_string(), "truecolor".to_string());
    env.insert("TERM_PROGRAM".to_string(), "blockterm".to_string());
    env.insert(
        "TERM_PROGRAM_VERSION".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    // Lets shell integration scripts tell sessions apart.
    env.insert(
        "BLOCKTERM_SESSION_ID".to_string(),
        uuid::Uuid::new_v4().to_string(),
    );

    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_resolves_absolute_shell() {
        assert_eq!(resolve_shell("/bin/sh").unwrap(), PathBuf::from("/bin/sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolves_bare_name_on_path() {
        let resolved = resolve_shell("sh").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("sh"));
    }

    #[test]
    fn test_missing_shell_is_not_found() {
        assert!(matches!(
            resolve_shell("/definitely/not/a/shell"),
            Err(SpawnError::ShellNotFound(_))
        ));
        assert!(matches!(
            resolve_shell("no-such-shell-blockterm"),
            Err(SpawnError::ShellNotFound(_))
        ));
        assert!(matches!(resolve_shell("  "), Err(SpawnError::ShellNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "echo hi").unwrap();
        assert!(matches!(
            resolve_shell(path.to_str().unwrap()),
            Err(SpawnError::NotExecutable(_))
        ));
    }

    #[test]
    fn test_working_dir_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_working_dir(dir.path()).is_ok());

        let file = dir.path().join("f");
        std::fs::write(&file, "").unwrap();
        assert!(matches!(
            validate_working_dir(&file),
            Err(SpawnError::InvalidWorkingDirectory(_))
        ));
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("TERM".to_string(), "dumb".to_string());
        overrides.insert("FOO".to_string(), "bar".to_string());

        let env = build_shell_env(&overrides);
        assert_eq!(env["TERM"], "dumb");
        assert_eq!(env["FOO"], "bar");
        assert_eq!(env["TERM_PROGRAM"], "blockterm");
        assert!(env.contains_key("BLOCKTERM_SESSION_ID"));
    }
}
