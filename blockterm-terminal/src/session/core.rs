//! State shared between a session handle and its reader thread.

use crate::block::{Block, BlockContent, BlockId, BlockLog};
use crate::events::{BoundaryEvent, EventSender, ExitReason, SessionEvent, SessionId};
use crate::parser::{BoundaryParser, ParserOutput};
use crate::scrollback::ScrollbackBuffer;
use parking_lot::RwLock;
use regex::bytes::Regex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A match found in a session's scrollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    /// Absolute stream offset of the first matched byte.
    pub offset: u64,
    pub length: usize,
}

struct SessionState {
    scrollback: ScrollbackBuffer,
    parser: BoundaryParser,
    blocks: BlockLog,
    cwd: Option<String>,
    finished: bool,
}

/// Scrollback, parser and block log of one session.
///
/// The reader thread is the only writer. Events are sent while the write lock
/// is held so that they leave in stream order even if `kill` has to finish
/// the stream on the reader's behalf.
pub(crate) struct SessionCore {
    id: SessionId,
    state: RwLock<SessionState>,
    events: EventSender,
    alive: AtomicBool,
    killed: AtomicBool,
}

impl SessionCore {
    pub(crate) fn new(
        id: SessionId,
        events: EventSender,
        scrollback_bytes: usize,
        max_blocks: usize,
        history: &[u8],
        cwd: Option<String>,
    ) -> Self {
        let mut scrollback = ScrollbackBuffer::new(scrollback_bytes);
        scrollback.push(history);
        let parser = BoundaryParser::with_offset(scrollback.end_offset());
        Self {
            id,
            state: RwLock::new(SessionState {
                scrollback,
                parser,
                blocks: BlockLog::new(max_blocks),
                cwd,
                finished: false,
            }),
            events,
            alive: AtomicBool::new(true),
            killed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    /// Record a chunk of child output. Returns `false` once the stream was finished.
    pub(crate) fn ingest(&self, chunk: &[u8]) -> bool {
        let mut state = self.state.write();
        if state.finished {
            return false;
        }
        state.scrollback.push(chunk);
        let outputs = state.parser.feed(chunk);
        self.dispatch(&mut state, outputs);
        true
    }

    /// End the stream: close any open block and report the exit. Only the
    /// first call has an effect.
    pub(crate) fn finish(&self, reason: ExitReason) {
        let mut state = self.state.write();
        if state.finished {
            return;
        }
        state.finished = true;
        let outputs = state.parser.finish();
        self.dispatch(&mut state, outputs);
        self.alive.store(false, Ordering::SeqCst);

        let reason = if self.killed.load(Ordering::SeqCst) {
            ExitReason::Killed
        } else {
            reason
        };
        log::info!("Session {} exited: {:?}", self.id, reason);
        self.send(SessionEvent::SessionExited {
            session: self.id,
            reason,
        });
    }

    fn dispatch(&self, state: &mut SessionState, outputs: Vec<ParserOutput>) {
        let now = chrono::Utc::now();
        for output in outputs {
            match output {
                ParserOutput::Display(bytes) => self.send(SessionEvent::Output {
                    session: self.id,
                    bytes,
                }),
                ParserOutput::Boundary(event) => {
                    state.blocks.apply(&event, now);
                    if let BoundaryEvent::CwdChanged { cwd } = &event {
                        log::debug!("Session {} cwd changed to {}", self.id, cwd);
                        state.cwd = Some(cwd.clone());
                    }
                    self.send(SessionEvent::from_boundary(self.id, event));
                }
            }
        }
    }

    fn send(&self, event: SessionEvent) {
        // A dropped receiver only means nobody is listening any more.
        if self.events.send(event).is_err() {
            log::trace!("Session {} event dropped: receiver closed", self.id);
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the session as killed. Returns `true` if it already was.
    pub(crate) fn mark_killed(&self) -> bool {
        self.killed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state.read().finished
    }

    pub(crate) fn scrollback_snapshot(&self) -> Vec<u8> {
        self.state.read().scrollback.snapshot()
    }

    pub(crate) fn scrollback_offsets(&self) -> (u64, u64) {
        let state = self.state.read();
        (state.scrollback.start_offset(), state.scrollback.end_offset())
    }

    pub(crate) fn cwd(&self) -> Option<String> {
        self.state.read().cwd.clone()
    }

    pub(crate) fn blocks(&self) -> Vec<Block> {
        self.state.read().blocks.iter().cloned().collect()
    }

    pub(crate) fn block(&self, id: BlockId) -> Option<Block> {
        self.state.read().blocks.get(id).cloned()
    }

    pub(crate) fn current_block(&self) -> Option<Block> {
        self.state.read().blocks.current().cloned()
    }

    pub(crate) fn block_content(&self, id: BlockId) -> Option<BlockContent> {
        let state = self.state.read();
        state.blocks.content(id, &state.scrollback)
    }

    pub(crate) fn block_command_text(&self, id: BlockId) -> Option<String> {
        let state = self.state.read();
        state.blocks.command_text(id, &state.scrollback)
    }

    pub(crate) fn search(&self, pattern: &Regex) -> Vec<SearchMatch> {
        let state = self.state.read();
        let base = state.scrollback.start_offset();
        let haystack = state.scrollback.snapshot();
        pattern
            .find_iter(&haystack)
            .map(|m| SearchMatch {
                offset: base + m.start() as u64,
                length: m.len(),
            })
            .collect()
    }
}
