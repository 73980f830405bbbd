//! Command blocks and the per-session block log.

use crate::events::BoundaryEvent;
use crate::scrollback::ScrollbackBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Per-session block sequence number, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    Open,
    Closed,
}

/// Why a block was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The shell reported the command finished.
    Finished,
    /// A new prompt or command started before the shell reported an end.
    Superseded,
    /// The session's output stream ended.
    SessionEnded,
}

/// One command plus its output, addressed by absolute scrollback offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub state: BlockState,
    /// First byte after the command-start marker.
    pub start_offset: u64,
    /// First byte of command output, if the shell reported it.
    pub output_offset: Option<u64>,
    /// First byte after the block's content. `None` while open.
    pub end_offset: Option<u64>,
    /// `None` while open, and for blocks closed without a reported code.
    pub exit_code: Option<i32>,
    pub close_reason: Option<CloseReason>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Block {
    pub fn is_open(&self) -> bool {
        self.state == BlockState::Open
    }
}

/// Bytes of a block as still retained by the scrollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContent {
    pub bytes: Vec<u8>,
    /// The block's start was evicted; `bytes` is only the retained suffix.
    pub truncated: bool,
}

/// Ordered blocks of one session, bounded to `max_blocks` entries.
#[derive(Debug)]
pub struct BlockLog {
    blocks: VecDeque<Block>,
    max_blocks: usize,
}

impl BlockLog {
    pub fn new(max_blocks: usize) -> Self {
        Self {
            blocks: VecDeque::new(),
            max_blocks: max_blocks.max(1),
        }
    }

    /// Update the log from a parser event.
    pub fn apply(&mut self, event: &BoundaryEvent, now: DateTime<Utc>) {
        match event {
            BoundaryEvent::BlockOpened {
                block_id,
                start_offset,
            } => {
                self.blocks.push_back(Block {
                    id: *block_id,
                    state: BlockState::Open,
                    start_offset: *start_offset,
                    output_offset: None,
                    end_offset: None,
                    exit_code: None,
                    close_reason: None,
                    started_at: now,
                    ended_at: None,
                });
                self.enforce_limit();
            }
            BoundaryEvent::CommandExecuted { block_id, offset } => {
                if let Some(block) = self.get_mut(*block_id) {
                    block.output_offset = Some(*offset);
                }
            }
            BoundaryEvent::BlockClosed {
                block_id,
                end_offset,
                exit_code,
                reason,
            } => {
                if let Some(block) = self.get_mut(*block_id) {
                    block.state = BlockState::Closed;
                    block.end_offset = Some(*end_offset);
                    block.exit_code = *exit_code;
                    block.close_reason = Some(*reason);
                    block.ended_at = Some(now);
                }
            }
            BoundaryEvent::PromptStarted { .. } | BoundaryEvent::CwdChanged { .. } => {}
        }
    }

    fn enforce_limit(&mut self) {
        while self.blocks.len() > self.max_blocks {
            // Only the newest block can be open, so the front is always closed here.
            self.blocks.pop_front();
        }
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().rev().find(|b| b.id == id)
    }

    fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().rev().find(|b| b.id == id)
    }

    /// The open block, if any.
    pub fn current(&self) -> Option<&Block> {
        self.blocks.back().filter(|b| b.is_open())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// A block's bytes. Open blocks extend to the current end of the stream.
    pub fn content(&self, id: BlockId, scrollback: &ScrollbackBuffer) -> Option<BlockContent> {
        let block = self.get(id)?;
        let end = block.end_offset.unwrap_or_else(|| scrollback.end_offset());
        let range = scrollback.range(block.start_offset, end);
        Some(BlockContent {
            bytes: range.bytes,
            truncated: range.truncated,
        })
    }

    /// The command line typed for a block: the bytes between the command-start
    /// and command-executed markers, with control bytes removed and trimmed.
    pub fn command_text(&self, id: BlockId, scrollback: &ScrollbackBuffer) -> Option<String> {
        let block = self.get(id)?;
        let end = block.output_offset?;
        let range = scrollback.range(block.start_offset, end);
        if range.truncated {
            return None;
        }
        let text = String::from_utf8_lossy(&strip_escapes(&range.bytes)).trim().to_string();
        Some(text)
    }
}

/// Drop escape sequences and C0 controls other than newline and tab.
fn strip_escapes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0x1b => {
                i += 1;
                match bytes.get(i) {
                    // CSI: parameters then a final byte in 0x40..=0x7e
                    Some(b'[') => {
                        i += 1;
                        while i < bytes.len() && !(0x40..=0x7e).contains(&bytes[i]) {
                            i += 1;
                        }
                        i += 1;
                    }
                    // OSC: until BEL or ESC \
                    Some(b']') => {
                        i += 1;
                        while i < bytes.len() && bytes[i] != 0x07 && bytes[i] != 0x1b {
                            i += 1;
                        }
                        if bytes.get(i) == Some(&0x1b) {
                            i += 1;
                        }
                        i += 1;
                    }
                    Some(_) => i += 1,
                    None => {}
                }
            }
            b'\n' | b'\t' => {
                out.push(bytes[i]);
                i += 1;
            }
            b if b < 0x20 || b == 0x7f => i += 1,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}
