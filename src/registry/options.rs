//! Defaults applied to every session the registry starts, and the layout
//! requests `create_tab` accepts.

use crate::layout::PaneTree;
use blockterm_config::{Config, ConfigError};
use blockterm_terminal::ShellIntegration;
use blockterm_terminal::session::{DEFAULT_KILL_GRACE, DEFAULT_MAX_BLOCKS, DEFAULT_SCROLLBACK_BYTES};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by all sessions of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryOptions {
    pub shell: String,
    pub shell_args: Vec<String>,
    /// Environment overrides for every child.
    pub env: HashMap<String, String>,
    /// Directory for panes that neither ask for one nor inherit one.
    pub working_directory: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    pub scrollback_bytes: usize,
    pub max_blocks: usize,
    pub kill_grace: Duration,
    /// Prompt hooks loaded into pane shells. `None` leaves shells untouched.
    pub shell_integration: Option<ShellIntegration>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            shell_args: Vec::new(),
            env: HashMap::new(),
            working_directory: None,
            cols: 80,
            rows: 24,
            scrollback_bytes: DEFAULT_SCROLLBACK_BYTES,
            max_blocks: DEFAULT_MAX_BLOCKS,
            kill_grace: DEFAULT_KILL_GRACE,
            shell_integration: None,
        }
    }
}

impl RegistryOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let shell = config.shell_command()?;
        Ok(Self {
            shell: shell.program,
            shell_args: shell.args,
            env: config.shell_env.clone().unwrap_or_default(),
            working_directory: config.effective_working_directory(),
            cols: config.cols,
            rows: config.rows,
            scrollback_bytes: config.scrollback_bytes,
            max_blocks: config.max_blocks,
            kill_grace: Duration::from_millis(config.kill_grace_ms),
            shell_integration: config
                .shell_integration
                .then(|| ShellIntegration::new(Config::shell_integration_dir())),
        })
    }
}

/// One pane of a requested layout. Unset fields fall back to the registry
/// defaults (and, for the directory, to the parent tab's).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaneSpec {
    pub cwd: Option<PathBuf>,
    pub shell: Option<String>,
    /// Only used together with `shell`.
    pub args: Vec<String>,
    /// `(cols, rows)`
    pub size: Option<(u16, u16)>,
}

impl PaneSpec {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn with_shell<I, S>(mut self, shell: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell = Some(shell.into());
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Layout for a new tab.
#[derive(Debug, Clone, PartialEq)]
pub struct TabLayout {
    pub title: Option<String>,
    pub root: PaneTree<PaneSpec>,
    /// Leaf-order index of the pane to focus.
    pub active_pane_index: usize,
}

impl Default for TabLayout {
    fn default() -> Self {
        Self::single(PaneSpec::default())
    }
}

impl TabLayout {
    /// A tab with a single pane.
    pub fn single(pane: PaneSpec) -> Self {
        Self::tree(PaneTree::leaf(pane))
    }

    pub fn tree(root: PaneTree<PaneSpec>) -> Self {
        Self {
            title: None,
            root,
            active_pane_index: 0,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
