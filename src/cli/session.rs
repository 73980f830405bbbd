//! `blockterm session` subcommands

use super::SessionCommand;
use crate::layout::PaneTree;
use crate::session::storage::{clear_session, load_session_from};
use crate::session::{SerializedPane, SerializedState};
use anyhow::Result;
use blockterm_config::Config;

pub fn run(config: &Config, action: SessionCommand) -> Result<i32> {
    let path = config.effective_session_path();
    match action {
        SessionCommand::Show => {
            match load_session_from(&path)? {
                Some(state) => print!("{}", summarize(&state)),
                None => println!("No saved session at {}", path.display()),
            }
            Ok(0)
        }
        SessionCommand::Clear => {
            clear_session(&path)?;
            println!("Removed {}", path.display());
            Ok(0)
        }
    }
}

/// Human-readable outline of a saved session.
pub fn summarize(state: &SerializedState) -> String {
    let mut out = format!(
        "Saved at {} ({} tabs, {} panes)\n",
        state.saved_at,
        state.tabs.len(),
        state.pane_count()
    );
    for (index, tab) in state.tabs.iter().enumerate() {
        let marker = if index == state.active_tab_index { "*" } else { " " };
        out.push_str(&format!("{marker} [{index}] {}\n", tab.title));
        outline(&tab.layout, 2, &mut out);
    }
    out
}

fn outline(node: &PaneTree<SerializedPane>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        PaneTree::Leaf(pane) => out.push_str(&format!(
            "{indent}{} in {} ({}x{}, {} bytes of scrollback)\n",
            pane.shell,
            pane.cwd.as_deref().unwrap_or("?"),
            pane.cols,
            pane.rows,
            pane.scrollback.len()
        )),
        PaneTree::Split {
            direction,
            ratio,
            first,
            second,
        } => {
            out.push_str(&format!("{indent}{:?} split at {:.2}\n", direction, ratio));
            outline(first, depth + 1, out);
            outline(second, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SplitDirection;
    use crate::session::SerializedTab;

    fn pane(cwd: &str) -> PaneTree<SerializedPane> {
        PaneTree::leaf(SerializedPane {
            cwd: Some(cwd.to_string()),
            cols: 80,
            rows: 24,
            shell: "/bin/bash".to_string(),
            args: Vec::new(),
            scrollback: vec![b'x'; 12],
        })
    }

    #[test]
    fn test_summary_outlines_tabs_and_splits() {
        let state = SerializedState {
            saved_at: "2025-06-01T12:00:00Z".to_string(),
            tabs: vec![
                SerializedTab {
                    title: "build".to_string(),
                    active_pane_index: 0,
                    layout: pane("/src"),
                },
                SerializedTab {
                    title: "logs".to_string(),
                    active_pane_index: 1,
                    layout: PaneTree::split(SplitDirection::Horizontal, 0.5, pane("/var/log"), pane("/tmp")),
                },
            ],
            active_tab_index: 1,
        };

        let summary = summarize(&state);
        assert!(summary.starts_with("Saved at 2025-06-01T12:00:00Z (2 tabs, 3 panes)\n"));
        assert!(summary.contains("  [0] build\n"));
        assert!(summary.contains("* [1] logs\n"));
        assert!(summary.contains("    Horizontal split at 0.50\n"));
        assert!(summary.contains("      /bin/bash in /var/log (80x24, 12 bytes of scrollback)\n"));
    }
}
