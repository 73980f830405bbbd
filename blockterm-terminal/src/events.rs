//! Events produced by the boundary parser and by PTY sessions.

use crate::block::{BlockId, CloseReason};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque session identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Block lifecycle transitions detected in one session's byte stream.
///
/// Offsets are absolute stream offsets, aligned with the session's
/// [`ScrollbackBuffer`](crate::ScrollbackBuffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryEvent {
    PromptStarted {
        offset: u64,
    },
    BlockOpened {
        block_id: BlockId,
        start_offset: u64,
    },
    CommandExecuted {
        block_id: BlockId,
        offset: u64,
    },
    BlockClosed {
        block_id: BlockId,
        end_offset: u64,
        exit_code: Option<i32>,
        reason: CloseReason,
    },
    CwdChanged {
        cwd: String,
    },
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The child exited on its own. `None` when the status was not available.
    Exited(Option<u32>),
    /// The session was killed through `kill`.
    Killed,
    /// Reading the PTY failed.
    ReadError(String),
}

/// Everything a session reports to its owner, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Display bytes with boundary markers removed.
    Output {
        session: SessionId,
        bytes: Vec<u8>,
    },
    PromptStarted {
        session: SessionId,
        offset: u64,
    },
    BlockOpened {
        session: SessionId,
        block_id: BlockId,
        start_offset: u64,
    },
    CommandExecuted {
        session: SessionId,
        block_id: BlockId,
        offset: u64,
    },
    BlockClosed {
        session: SessionId,
        block_id: BlockId,
        end_offset: u64,
        exit_code: Option<i32>,
        reason: CloseReason,
    },
    CwdChanged {
        session: SessionId,
        cwd: String,
    },
    SessionExited {
        session: SessionId,
        reason: ExitReason,
    },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Output { session, .. }
            | SessionEvent::PromptStarted { session, .. }
            | SessionEvent::BlockOpened { session, .. }
            | SessionEvent::CommandExecuted { session, .. }
            | SessionEvent::BlockClosed { session, .. }
            | SessionEvent::CwdChanged { session, .. }
            | SessionEvent::SessionExited { session, .. } => *session,
        }
    }

    /// Attach a session id to a parser event.
    pub fn from_boundary(session: SessionId, event: BoundaryEvent) -> Self {
        match event {
            BoundaryEvent::PromptStarted { offset } => SessionEvent::PromptStarted { session, offset },
            BoundaryEvent::BlockOpened {
                block_id,
                start_offset,
            } => SessionEvent::BlockOpened {
                session,
                block_id,
                start_offset,
            },
            BoundaryEvent::CommandExecuted { block_id, offset } => SessionEvent::CommandExecuted {
                session,
                block_id,
                offset,
            },
            BoundaryEvent::BlockClosed {
                block_id,
                end_offset,
                exit_code,
                reason,
            } => SessionEvent::BlockClosed {
                session,
                block_id,
                end_offset,
                exit_code,
                reason,
            },
            BoundaryEvent::CwdChanged { cwd } => SessionEvent::CwdChanged { session, cwd },
        }
    }
}

/// Sending half of the channel every session reports into.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<SessionEvent>;
/// Receiving half, owned by the session registry.
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<SessionEvent>;

/// Create the channel sessions report into.
pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_boundary_events_keep_their_session() {
        let id = SessionId::next();
        let event = SessionEvent::from_boundary(
            id,
            BoundaryEvent::BlockClosed {
                block_id: BlockId(4),
                end_offset: 10,
                exit_code: Some(1),
                reason: CloseReason::Finished,
            },
        );
        assert_eq!(event.session(), id);
        assert!(matches!(
            event,
            SessionEvent::BlockClosed {
                exit_code: Some(1),
                ..
            }
        ));
    }
}
