//! Registry errors and restore reporting.

use crate::layout::{PaneId, TabId};
use blockterm_config::ConfigError;
use blockterm_terminal::SpawnError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("unknown tab: {0}")]
    UnknownTab(TabId),

    #[error("unknown pane: {0}")]
    UnknownPane(PaneId),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Something that went wrong for one pane during restore. The rest of the
/// restore is unaffected.
#[derive(Debug)]
pub enum RestoreWarning {
    /// The saved directory is gone; the pane was started in `fallback`.
    MissingDirectory {
        pane: PaneId,
        requested: String,
        fallback: Option<String>,
    },
    /// The shell could not be started. The pane stays in the layout without a
    /// session and keeps its saved scrollback.
    SpawnFailed { pane: PaneId, error: SpawnError },
}

impl RestoreWarning {
    pub fn pane(&self) -> PaneId {
        match self {
            RestoreWarning::MissingDirectory { pane, .. }
            | RestoreWarning::SpawnFailed { pane, .. } => *pane,
        }
    }
}

impl fmt::Display for RestoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreWarning::MissingDirectory {
                pane,
                requested,
                fallback,
            } => write!(
                f,
                "{pane}: directory '{requested}' no longer exists, using {}",
                fallback.as_deref().unwrap_or("the default directory")
            ),
            RestoreWarning::SpawnFailed { pane, error } => {
                write!(f, "{pane}: shell could not be restarted: {error}")
            }
        }
    }
}

/// Outcome of [`SessionRegistry::restore`](super::SessionRegistry::restore).
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Restored tabs in saved order
    pub tabs: Vec<TabId>,
    pub warnings: Vec<RestoreWarning>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
