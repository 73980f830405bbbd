//! blockterm: a terminal session engine.
//!
//! - [`registry`]: PTY sessions arranged in tabs and split panes, with one
//!   event stream and snapshot/restore
//! - [`layout`]: the tab/pane arena the registry edits
//! - [`session`]: the serialized form of the registry, and its file I/O
//!
//! Per-session machinery (PTY, block parser, scrollback) lives in
//! `blockterm-terminal`; the undoable file-edit journal in `blockterm-journal`.
//!
//! # Mutex Usage Policy
//!
//!   - `parking_lot::Mutex` / `RwLock`: sync-only state: the session map, the
//!     layout arena, per-session I/O. Never held across an `.await` or across
//!     per-session I/O.
//!
//!   - `tokio::sync::Mutex`: only the registry's event receiver, which
//!     `next_event().await` holds while waiting. Sync callers use `try_lock()`.

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod cli;
pub mod debug;
pub mod layout;
pub mod registry;
pub mod session;

pub use layout::{PaneId, PaneTree, SplitDirection, TabId};
pub use registry::{
    PaneSpec, RegistryError, RegistryOptions, RestoreReport, RestoreWarning, SessionRegistry,
    TabLayout,
};
pub use session::{SerializedPane, SerializedState, SerializedTab};
