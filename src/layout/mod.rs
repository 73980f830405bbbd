//! Tab/pane layout
//!
//! Tabs own binary trees of panes. The trees live in an arena
//! ([`LayoutArena`]) of nodes addressed by id; parents and the active pane
//! are recorded as ids, never as references.

mod arena;
mod tree;

pub use arena::{LayoutArena, PaneRemoval, Tab};
pub use tree::PaneTree;

use blockterm_terminal::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u64);

/// Unique identifier for a pane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId(pub u64);

/// Arena slot id. Internal to the layout; stable for the life of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pane-{}", self.0)
    }
}

/// Direction of a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitDirection {
    /// Panes are stacked vertically (split creates top/bottom panes)
    Horizontal,
    /// Panes are side by side (split creates left/right panes)
    Vertical,
}

/// What a pane remembers about its shell, independent of whether the shell
/// is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneState {
    /// `None` when the shell could not be (re)spawned.
    pub session: Option<SessionId>,
    /// Last known working directory.
    pub cwd: Option<String>,
    pub cols: u16,
    pub rows: u16,
    pub shell: String,
    pub args: Vec<String>,
    /// Scrollback kept for panes without a session, so it survives the next
    /// snapshot.
    pub history: Vec<u8>,
}

/// A leaf of a tab's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pane {
    pub id: PaneId,
    pub state: PaneState,
}
