//! Streaming block-boundary parser.
//!
//! Scans a session's raw output for shell-integration markers (see
//! [`marker`]) and turns them into [`BoundaryEvent`]s while passing every other
//! byte through for display. Input may be split at any byte: a possible marker
//! prefix at the end of a chunk is held back until later bytes complete or
//! refute it, and refuted bytes are released in their original order.
//!
//! Block phases:
//!
//! ```text
//!   AwaitingPrompt --A--> PromptActive --B--> CommandActive --D--> AwaitingPrompt
//!                                                  |  ^
//!                                                  +--+ B or A: force-close, reopen
//! ```

pub mod marker;

#[cfg(test)]
mod tests;

use crate::block::{BlockId, CloseReason};
use crate::events::BoundaryEvent;
use marker::{BEL, ESC, Marker, OSC_INTRODUCER, OscKind, ST_FINAL};
use std::collections::VecDeque;

/// Where the session is in the prompt/command cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPhase {
    AwaitingPrompt,
    PromptActive,
    CommandActive,
}

/// Parser output, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserOutput {
    /// Pass-through bytes; consecutive display bytes are coalesced.
    Display(Vec<u8>),
    Boundary(BoundaryEvent),
}

/// Recognizer state for a candidate escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Ground,
    /// Saw `ESC`.
    Escape,
    /// Saw `ESC ]`, reading the OSC number.
    OscNumber,
    /// Inside a recognized OSC payload.
    Payload(OscKind),
    /// Saw `ESC` inside a payload; `\` completes the sequence.
    PayloadEscape(OscKind),
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    id: BlockId,
    saw_output: bool,
}

/// Per-session boundary parser.
#[derive(Debug)]
pub struct BoundaryParser {
    scan: Scan,
    /// Bytes of the candidate sequence, starting with its `ESC`.
    pending: Vec<u8>,
    /// Stream offset of `pending[0]`.
    pending_start: u64,
    /// Index in `pending` where the OSC payload begins.
    payload_start: usize,
    /// Stream offset of the next input byte.
    offset: u64,
    phase: BlockPhase,
    open: Option<OpenBlock>,
    last_block_id: u64,
}

impl Default for BoundaryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryParser {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Start counting stream offsets at `offset` (used when the scrollback was
    /// seeded with restored history).
    pub fn with_offset(offset: u64) -> Self {
        Self {
            scan: Scan::Ground,
            pending: Vec::new(),
            pending_start: offset,
            payload_start: 0,
            offset,
            phase: BlockPhase::AwaitingPrompt,
            open: None,
            last_block_id: 0,
        }
    }

    pub fn phase(&self) -> BlockPhase {
        self.phase
    }

    /// Id of the open block, if any.
    pub fn open_block(&self) -> Option<BlockId> {
        self.open.map(|b| b.id)
    }

    /// Offset of the next byte to be fed.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bytes currently held back as a possible marker prefix.
    pub fn held_back(&self) -> usize {
        self.pending.len()
    }

    /// Process one chunk of output.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParserOutput> {
        let mut out = Output::default();
        for &byte in chunk {
            let offset = self.offset;
            self.offset += 1;
            self.process(byte, offset, &mut out);
        }
        out.items
    }

    /// End of stream: release held-back bytes and close any open block.
    pub fn finish(&mut self) -> Vec<ParserOutput> {
        let mut out = Output::default();
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            out.display(&pending);
        }
        self.scan = Scan::Ground;

        if let Some(open) = self.open.take() {
            log::debug!(
                "Stream ended with block {} open, closing without exit code",
                open.id
            );
            out.boundary(BoundaryEvent::BlockClosed {
                block_id: open.id,
                end_offset: self.offset,
                exit_code: None,
                reason: CloseReason::SessionEnded,
            });
        }
        self.phase = BlockPhase::AwaitingPrompt;
        out.items
    }

    fn process(&mut self, byte: u8, offset: u64, out: &mut Output) {
        if self.step(byte, offset, out) {
            return;
        }

        // Refuted. Release pending bytes up to the next ESC inside them and
        // rescan from there, followed by the byte that caused the refutation.
        let mut queue = VecDeque::from([(byte, offset)]);
        while let Some((byte, offset)) = queue.pop_front() {
            if self.step(byte, offset, out) {
                continue;
            }
            let pending = std::mem::take(&mut self.pending);
            let pending_start = self.pending_start;
            self.scan = Scan::Ground;

            let restart = pending
                .iter()
                .skip(1)
                .position(|&b| b == ESC)
                .map_or(pending.len(), |p| p + 1);
            out.display(&pending[..restart]);

            queue.push_front((byte, offset));
            for (i, &b) in pending[restart..].iter().enumerate().rev() {
                queue.push_front((b, pending_start + (restart + i) as u64));
            }
        }
    }

    /// Advance the recognizer by one byte. Returns `false` when the byte
    /// refutes the pending candidate; the caller then releases it.
    fn step(&mut self, byte: u8, offset: u64, out: &mut Output) -> bool {
        match self.scan {
            Scan::Ground => {
                if byte == ESC {
                    self.pending.clear();
                    self.pending.push(byte);
                    self.pending_start = offset;
                    self.scan = Scan::Escape;
                } else {
                    out.display_byte(byte);
                }
                true
            }
            Scan::Escape => {
                if byte != OSC_INTRODUCER {
                    return false;
                }
                self.pending.push(byte);
                self.scan = Scan::OscNumber;
                true
            }
            Scan::OscNumber => {
                let number = &self.pending[2..];
                if byte.is_ascii_digit() && number.len() < 3 {
                    self.pending.push(byte);
                    return true;
                }
                if byte == b';'
                    && let Some(kind) = OscKind::from_number(number)
                {
                    self.pending.push(byte);
                    self.payload_start = self.pending.len();
                    self.scan = Scan::Payload(kind);
                    return true;
                }
                false
            }
            Scan::Payload(kind) => match byte {
                BEL => {
                    self.complete(kind, self.pending.len(), byte, offset, out);
                    true
                }
                ESC => {
                    self.pending.push(byte);
                    self.scan = Scan::PayloadEscape(kind);
                    true
                }
                _ if byte < 0x20 || byte == 0x7f => false,
                _ if self.pending.len() - self.payload_start >= kind.payload_limit() => false,
                _ => {
                    self.pending.push(byte);
                    true
                }
            },
            Scan::PayloadEscape(kind) => {
                if byte != ST_FINAL {
                    return false;
                }
                self.complete(kind, self.pending.len() - 1, byte, offset, out);
                true
            }
        }
    }

    /// A full sequence ends at `terminator` (stream offset `offset`).
    fn complete(
        &mut self,
        kind: OscKind,
        payload_end: usize,
        terminator: u8,
        offset: u64,
        out: &mut Output,
    ) {
        let pending = std::mem::take(&mut self.pending);
        self.scan = Scan::Ground;

        match marker::decode(kind, &pending[self.payload_start..payload_end]) {
            Some(marker) => self.apply(marker, self.pending_start, offset + 1, out),
            None => {
                log::debug!(
                    "Unrecognized OSC payload {:?} at offset {}, passing through",
                    String::from_utf8_lossy(&pending[self.payload_start..payload_end]),
                    self.pending_start
                );
                out.display(&pending);
                out.display_byte(terminator);
            }
        }
    }

    /// Apply a marker spanning stream offsets `[start, end)`.
    fn apply(&mut self, marker: Marker, start: u64, end: u64, out: &mut Output) {
        match marker {
            Marker::PromptStart => {
                self.force_close(start, out);
                self.phase = BlockPhase::PromptActive;
                out.boundary(BoundaryEvent::PromptStarted { offset: start });
            }
            Marker::CommandStart => {
                self.force_close(start, out);
                self.last_block_id += 1;
                let id = BlockId(self.last_block_id);
                self.open = Some(OpenBlock {
                    id,
                    saw_output: false,
                });
                self.phase = BlockPhase::CommandActive;
                out.boundary(BoundaryEvent::BlockOpened {
                    block_id: id,
                    start_offset: end,
                });
            }
            Marker::CommandExecuted => match self.open.as_mut() {
                Some(open) if !open.saw_output => {
                    open.saw_output = true;
                    out.boundary(BoundaryEvent::CommandExecuted {
                        block_id: open.id,
                        offset: end,
                    });
                }
                Some(_) => log::debug!("Repeated command-executed marker at offset {start}"),
                None => log::debug!("Command-executed marker with no open block at offset {start}"),
            },
            Marker::CommandEnd { exit_code } => {
                match self.open.take() {
                    Some(open) => out.boundary(BoundaryEvent::BlockClosed {
                        block_id: open.id,
                        end_offset: start,
                        exit_code,
                        reason: CloseReason::Finished,
                    }),
                    None => log::debug!("Command-end marker with no open block at offset {start}"),
                }
                self.phase = BlockPhase::AwaitingPrompt;
            }
            Marker::WorkingDirectory(cwd) => {
                out.boundary(BoundaryEvent::CwdChanged { cwd });
            }
        }
    }

    /// Close the open block, if any, because a new prompt or command began at `at`.
    fn force_close(&mut self, at: u64, out: &mut Output) {
        if let Some(open) = self.open.take() {
            log::debug!("Block {} superseded at offset {at} without command-end", open.id);
            out.boundary(BoundaryEvent::BlockClosed {
                block_id: open.id,
                end_offset: at,
                exit_code: None,
                reason: CloseReason::Superseded,
            });
        }
    }
}

#[derive(Default)]
struct Output {
    items: Vec<ParserOutput>,
}

impl Output {
    fn display_byte(&mut self, byte: u8) {
        match self.items.last_mut() {
            Some(ParserOutput::Display(bytes)) => bytes.push(byte),
            _ => self.items.push(ParserOutput::Display(vec![byte])),
        }
    }

    fn display(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match self.items.last_mut() {
            Some(ParserOutput::Display(bytes)) => bytes.extend_from_slice(data),
            _ => self.items.push(ParserOutput::Display(data.to_vec())),
        }
    }

    fn boundary(&mut self, event: BoundaryEvent) {
        self.items.push(ParserOutput::Boundary(event));
    }
}
