//! Bounded byte ring holding a session's raw output.
//!
//! Offsets are absolute: byte `n` of the session's output stream keeps the
//! offset `n` forever, even after it has been evicted. `start_offset()` is the
//! oldest byte still retained and `end_offset()` the total number of bytes ever
//! appended, so a caller holding an offset range can always tell whether (and
//! how much of) it has been evicted.

use std::collections::VecDeque;

/// A slice of retained scrollback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScrollbackRange {
    /// Retained bytes of the requested range.
    pub bytes: Vec<u8>,
    /// Absolute offset of `bytes[0]`.
    pub start_offset: u64,
    /// `true` when the front of the requested range was already evicted.
    pub truncated: bool,
}

/// FIFO byte buffer capped at `capacity` bytes.
#[derive(Debug, Clone)]
pub struct ScrollbackBuffer {
    data: VecDeque<u8>,
    capacity: usize,
    start_offset: u64,
}

impl ScrollbackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::with_start_offset(capacity, 0)
    }

    /// Create a buffer whose first byte will carry `start_offset`.
    pub fn with_start_offset(capacity: usize, start_offset: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            start_offset,
        }
    }

    /// Append bytes, evicting the oldest ones once the cap is exceeded.
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.capacity {
            // The chunk alone fills the ring: keep only its tail.
            let skipped = bytes.len() - self.capacity;
            self.start_offset += (self.data.len() + skipped) as u64;
            self.data.clear();
            self.data.extend(&bytes[skipped..]);
            return;
        }

        let overflow = (self.data.len() + bytes.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.data.drain(..overflow);
            self.start_offset += overflow as u64;
        }
        self.data.extend(bytes);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the oldest retained byte.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Offset one past the newest byte (total bytes ever appended).
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.data.len() as u64
    }

    /// Copy out `[start, end)`, clipped to what is still retained.
    pub fn range(&self, start: u64, end: u64) -> ScrollbackRange {
        let end = end.min(self.end_offset());
        let truncated = start < self.start_offset;
        let start = start.max(self.start_offset);
        if start >= end {
            return ScrollbackRange {
                bytes: Vec::new(),
                start_offset: start.min(self.end_offset()),
                truncated,
            };
        }

        let from = (start - self.start_offset) as usize;
        let to = (end - self.start_offset) as usize;
        ScrollbackRange {
            bytes: self.data.range(from..to).copied().collect(),
            start_offset: start,
            truncated,
        }
    }

    /// Copy of everything retained.
    pub fn snapshot(&self) -> Vec<u8> {
        let (a, b) = self.data.as_slices();
        let mut out = Vec::with_capacity(a.len() + b.len());
        out.extend_from_slice(a);
        out.extend_from_slice(b);
        out
    }

    /// Drop all retained bytes. Offsets keep counting from `end_offset()`.
    pub fn clear(&mut self) {
        self.start_offset = self.end_offset();
        self.data.clear();
    }
}
