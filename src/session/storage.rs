//! File I/O for session persistence
//!
//! Sessions are stored in `~/.config/blockterm/last_session.yaml` unless the
//! config names another file.

use super::SerializedState;
use anyhow::{Context, Result};
use std::path::Path;

/// Save session state to a specific file.
///
/// Written to a sibling temp file and renamed into place, so a crash mid-save
/// leaves the previous session intact.
pub fn save_session_to(state: &SerializedState, path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create session directory {:?}", parent))?;
    }

    let contents = serde_yaml_ng::to_string(state).context("Failed to serialize session state")?;

    let temp_path = path.with_extension("yaml.tmp");
    std::fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write session state to {:?}", temp_path))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move session state into {:?}", path))?;

    log::info!(
        "Saved session state ({} tabs, {} panes) to {:?}",
        state.tabs.len(),
        state.pane_count(),
        path
    );
    Ok(())
}

/// Load session state from a specific file
///
/// Returns `None` if the file doesn't exist or is empty.
/// Returns an error if the file exists but is corrupt.
pub fn load_session_from(path: &Path) -> Result<Option<SerializedState>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session state from {:?}", path))?;

    if contents.trim().is_empty() {
        return Ok(None);
    }

    let state: SerializedState = serde_yaml_ng::from_str(&contents)
        .with_context(|| format!("Failed to parse session state from {:?}", path))?;

    log::info!(
        "Loaded session state ({} tabs) from {:?}",
        state.tabs.len(),
        path
    );
    Ok(Some(state))
}

/// Remove the session state file (e.g., after successful restore)
pub fn clear_session(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove session state file {:?}", path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{PaneTree, SplitDirection};
    use crate::session::{SerializedPane, SerializedTab};
    use tempfile::tempdir;

    fn leaf(cwd: &str) -> PaneTree<SerializedPane> {
        PaneTree::leaf(SerializedPane {
            cwd: Some(cwd.to_string()),
            cols: 80,
            rows: 24,
            shell: "/bin/sh".to_string(),
            args: Vec::new(),
            scrollback: format!("output from {cwd}\n").into_bytes(),
        })
    }

    fn sample_session() -> SerializedState {
        SerializedState {
            saved_at: "2025-01-01T00:00:00Z".to_string(),
            tabs: vec![SerializedTab {
                title: "work".to_string(),
                active_pane_index: 0,
                layout: leaf("/home/user/work"),
            }],
            active_tab_index: 0,
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nonexistent.yaml");
        let result = load_session_from(&path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_empty_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("empty.yaml");
        std::fs::write(&path, "").unwrap();
        let result = load_session_from(&path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("corrupt.yaml");
        std::fs::write(&path, "not: valid: yaml: [[[").unwrap();
        let result = load_session_from(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("session.yaml");

        let state = sample_session();
        save_session_to(&state, &path).unwrap();

        let loaded = load_session_from(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!temp.path().join("session.yaml.tmp").exists());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("dir").join("session.yaml");

        let state = sample_session();
        save_session_to(&state, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_serialization_with_pane_layout() {
        let state = SerializedState {
            saved_at: "2025-01-01T00:00:00Z".to_string(),
            tabs: vec![SerializedTab {
                title: "dev".to_string(),
                active_pane_index: 2,
                layout: PaneTree::split(
                    SplitDirection::Vertical,
                    0.5,
                    leaf("/home/user/code"),
                    PaneTree::split(
                        SplitDirection::Horizontal,
                        0.6,
                        leaf("/home/user/logs"),
                        leaf("/home/user/tests"),
                    ),
                ),
            }],
            active_tab_index: 0,
        };

        let temp = tempdir().unwrap();
        let path = temp.path().join("pane_session.yaml");

        save_session_to(&state, &path).unwrap();
        let loaded = load_session_from(&path).unwrap().unwrap();

        // Verify the nested pane layout survived roundtrip
        let tab = &loaded.tabs[0];
        match &tab.layout {
            PaneTree::Split {
                direction, ratio, ..
            } => {
                assert_eq!(*direction, SplitDirection::Vertical);
                assert!((ratio - 0.5).abs() < f32::EPSILON);
            }
            _ => panic!("Expected Split at root"),
        }
        assert_eq!(tab.layout.leaf_count(), 3);
        assert_eq!(tab.layout.leaves()[2].scrollback, b"output from /home/user/tests\n");
    }

    #[test]
    fn test_clear_session() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("to_clear.yaml");
        save_session_to(&sample_session(), &path).unwrap();
        assert!(path.exists());

        clear_session(&path).unwrap();
        assert!(!path.exists());
        // Clearing twice is fine.
        clear_session(&path).unwrap();
    }
}
