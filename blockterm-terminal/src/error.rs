//! Error types for the blockterm-terminal crate.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to start a PTY session. No session (and no child process) is left
/// behind when one of these is returned.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The shell name did not resolve to a file.
    #[error("shell not found: {0}")]
    ShellNotFound(String),

    /// The shell path exists but cannot be executed.
    #[error("shell is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    /// The requested working directory does not exist or is not a directory.
    #[error("invalid working directory: {}", .0.display())]
    InvalidWorkingDirectory(PathBuf),

    /// The OS refused to allocate a pseudo-terminal.
    #[error("failed to allocate pseudo-terminal: {0}")]
    PtyAllocation(String),

    /// The child process could not be started.
    #[error("failed to spawn {shell}: {message}")]
    Spawn { shell: String, message: String },

    /// Cloning the PTY reader/writer or starting the reader thread failed.
    #[error("failed to set up PTY I/O: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_input() {
        let err = SpawnError::NotExecutable(PathBuf::from("/etc/passwd"));
        assert_eq!(err.to_string(), "shell is not executable: /etc/passwd");

        let err = SpawnError::Spawn {
            shell: "/bin/zsh".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert!(err.to_string().starts_with("failed to spawn /bin/zsh"));
    }
}
