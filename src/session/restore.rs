//! Helpers for restoring session state

use super::SerializedPane;
use crate::layout::PaneState;
use std::path::Path;

/// Validate a working directory path, falling back to $HOME if invalid
pub fn validate_cwd(cwd: &Option<String>) -> Option<String> {
    if let Some(dir) = cwd {
        if Path::new(dir).is_dir() {
            return Some(dir.clone());
        }
        log::warn!(
            "Session restore: directory '{}' no longer exists, falling back to home",
            dir
        );
    }
    // Fall back to home directory
    dirs::home_dir().map(|p| p.to_string_lossy().to_string())
}

/// A pane about to be respawned.
#[derive(Debug, Clone)]
pub struct PlannedPane {
    pub state: PaneState,
    /// Set when the saved directory was missing and `state.cwd` is the fallback.
    pub missing_cwd: Option<String>,
}

/// Turn a saved pane into pane state with a checked directory. The saved
/// scrollback becomes the history the new session is seeded with.
pub fn plan_pane(pane: SerializedPane) -> PlannedPane {
    let cwd = validate_cwd(&pane.cwd);
    let missing_cwd = match &pane.cwd {
        Some(requested) if cwd.as_ref() != Some(requested) => Some(requested.clone()),
        _ => None,
    };
    PlannedPane {
        state: PaneState {
            session: None,
            cwd,
            cols: pane.cols.max(1),
            rows: pane.rows.max(1),
            shell: pane.shell,
            args: pane.args,
            history: pane.scrollback,
        },
        missing_cwd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(cwd: Option<&str>) -> SerializedPane {
        SerializedPane {
            cwd: cwd.map(str::to_string),
            cols: 0,
            rows: 30,
            shell: "/bin/sh".to_string(),
            args: Vec::new(),
            scrollback: b"$ ls\n".to_vec(),
        }
    }

    #[test]
    fn test_validate_cwd_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = Some(dir.path().to_string_lossy().to_string());
        assert_eq!(validate_cwd(&cwd), cwd);
    }

    #[test]
    fn test_validate_cwd_missing_dir_falls_back_to_home() {
        let cwd = Some("/nonexistent/path/that/does/not/exist".to_string());
        let result = validate_cwd(&cwd);
        // Should fall back to home directory
        let home = dirs::home_dir().map(|p| p.to_string_lossy().to_string());
        assert_eq!(result, home);
    }

    #[test]
    fn test_validate_cwd_none_falls_back_to_home() {
        let result = validate_cwd(&None);
        let home = dirs::home_dir().map(|p| p.to_string_lossy().to_string());
        assert_eq!(result, home);
    }

    #[test]
    fn test_plan_pane_flags_missing_directory() {
        let planned = plan_pane(saved(Some("/nonexistent/blockterm/restore")));
        assert_eq!(
            planned.missing_cwd.as_deref(),
            Some("/nonexistent/blockterm/restore")
        );
        assert_eq!(planned.state.history, b"$ ls\n");
        assert_eq!(planned.state.cols, 1);
        assert!(planned.state.session.is_none());
    }

    #[test]
    fn test_plan_pane_keeps_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let planned = plan_pane(saved(Some(&path)));
        assert!(planned.missing_cwd.is_none());
        assert_eq!(planned.state.cwd, Some(path));
        assert!(plan_pane(saved(None)).missing_cwd.is_none());
    }
}
