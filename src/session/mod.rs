//! Serialized registry state for save/restore
//!
//! A snapshot of every tab's pane tree: per pane the working directory,
//! dimensions, shell and scrollback. Saved as YAML on clean exit and
//! restored on the next launch.

pub mod capture;
pub mod restore;
pub mod storage;

use crate::layout::PaneTree;
use serde::{Deserialize, Serialize};

/// Top-level session state: all tabs at the time of save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedState {
    /// Timestamp when the session was saved (RFC 3339)
    pub saved_at: String,
    /// Tabs in display order
    pub tabs: Vec<SerializedTab>,
    /// Index of the active tab
    #[serde(default)]
    pub active_tab_index: usize,
}

/// A single tab in a saved session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTab {
    pub title: String,
    /// Leaf-order index of the focused pane
    #[serde(default)]
    pub active_pane_index: usize,
    pub layout: PaneTree<SerializedPane>,
}

/// A terminal pane leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPane {
    /// Working directory of this pane
    pub cwd: Option<String>,
    pub cols: u16,
    pub rows: u16,
    pub shell: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Raw output bytes, base64 in the file
    #[serde(default, with = "base64_bytes")]
    pub scrollback: Vec<u8>,
}

impl SerializedState {
    pub fn pane_count(&self) -> usize {
        self.tabs.iter().map(|t| t.layout.leaf_count()).sum()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
