//! Capture registry state into its serializable form

use super::{SerializedPane, SerializedState, SerializedTab};
use crate::layout::{Pane, PaneTree};
use blockterm_terminal::PtySession;

/// A tab's tree copied out of the layout, ready to be captured without
/// holding the layout lock.
#[derive(Debug, Clone)]
pub struct TabSnapshot {
    pub title: String,
    pub active_pane_index: usize,
    pub layout: PaneTree<Pane>,
}

/// Build the serialized state. `session_of` looks up a pane's live (or
/// exited) session; `scrollback_cap` bounds each pane's saved bytes.
pub fn capture_session<S>(
    tabs: Vec<TabSnapshot>,
    active_tab_index: usize,
    session_of: impl Fn(&Pane) -> Option<S>,
    scrollback_cap: usize,
) -> SerializedState
where
    S: std::ops::Deref<Target = PtySession>,
{
    let tabs = tabs
        .into_iter()
        .map(|tab| SerializedTab {
            title: tab.title,
            active_pane_index: tab.active_pane_index,
            layout: tab.layout.map(&mut |pane| {
                let session = session_of(&pane);
                capture_pane(pane, session.as_deref(), scrollback_cap)
            }),
        })
        .collect();

    SerializedState {
        saved_at: chrono::Utc::now().to_rfc3339(),
        tabs,
        active_tab_index,
    }
}

/// Capture one pane, preferring what its session reports over the pane's
/// remembered state.
pub fn capture_pane(pane: Pane, session: Option<&PtySession>, scrollback_cap: usize) -> SerializedPane {
    let state = pane.state;
    let (cwd, (cols, rows), scrollback) = match session {
        Some(session) => (
            session.cwd().or(state.cwd),
            session.dimensions(),
            session.scrollback_snapshot(),
        ),
        None => (state.cwd, (state.cols, state.rows), state.history),
    };

    SerializedPane {
        cwd,
        cols,
        rows,
        shell: state.shell,
        args: state.args,
        scrollback: tail(scrollback, scrollback_cap),
    }
}

/// Keep at most the last `cap` bytes.
fn tail(mut bytes: Vec<u8>, cap: usize) -> Vec<u8> {
    if bytes.len() > cap {
        bytes.drain(..bytes.len() - cap);
    }
    bytes
}
