//! Terminal sessions for blockterm.
//!
//! This crate provides the per-session half of the engine:
//!
//! - PTY sessions (spawn, write, resize, kill)
//! - A streaming OSC 133 parser that segments output into command blocks
//! - A bounded scrollback buffer addressed by absolute stream offsets
//! - The event stream sessions report into
//! - Prompt hooks that make bash, zsh and fish emit those markers

pub mod block;
pub mod error;
pub mod events;
pub mod parser;
pub mod scrollback;
pub mod session;
pub mod shell_hooks;

// Re-export main types for convenience
pub use block::{Block, BlockContent, BlockId, BlockLog, BlockState, CloseReason};
pub use error::SpawnError;
pub use events::{
    BoundaryEvent, EventReceiver, EventSender, ExitReason, SessionEvent, SessionId, event_channel,
};
pub use parser::marker::Marker;
pub use parser::{BlockPhase, BoundaryParser, ParserOutput};
pub use scrollback::{ScrollbackBuffer, ScrollbackRange};
pub use session::{PtySession, SearchMatch, SpawnOptions};
pub use shell_hooks::{ShellIntegration, ShellKind};
