//! Segmented byte queue for partially buffered I/O.
//!
//! A [`ByteQueue`] is an ordered chain of owned segments. Data is appended as
//! new segments and consumed from the front, possibly a few bytes at a time:
//!
//! ```text
//! +-----------------+   +-----------+   +----------------------+
//! | consumed | live |-->|   live    |-->|         live         |
//! +-----------------+   +-----------+   +----------------------+
//!            ^ cursor
//! ```
//!
//! Only the front segment can be partially consumed. Segments are dropped as
//! soon as their last byte is consumed.

use std::collections::TryReserveError;
use std::collections::VecDeque;

use thiserror::Error;

/// Errors raised by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Memory for a segment or a drained buffer could not be reserved.
    #[error("failed to allocate queue buffer: {0}")]
    AllocationFailed(#[from] TryReserveError),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug)]
struct Segment {
    data: Vec<u8>,
    pos: usize,
}

impl Segment {
    fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }
}

/// Ordered, append-only chain of byte segments.
#[derive(Debug, Default)]
pub struct ByteQueue {
    segments: VecDeque<Segment>,
    len: usize,
}

impl ByteQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no unconsumed bytes remain.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `bytes` as a new segment.
    ///
    /// Existing segments are never touched. Empty input is ignored.
    pub fn push(&mut self, bytes: &[u8]) -> QueueResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())?;
        data.extend_from_slice(bytes);

        self.segments.try_reserve(1)?;
        self.segments.push_back(Segment { data, pos: 0 });
        self.len += bytes.len();
        Ok(())
    }

    /// Finds the offset of the first `byte` without consuming anything.
    pub fn peek_find(&self, byte: u8) -> Option<usize> {
        self.bytes().position(|b| b == byte)
    }

    /// Finds the offset of the first occurrence of `pattern`, even when it
    /// spans several segments.
    pub fn peek_find_seq(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() {
            return Some(0);
        }
        if pattern.len() > self.len {
            return None;
        }

        // Sliding window over the chained bytes.
        let mut window: VecDeque<u8> = VecDeque::with_capacity(pattern.len());
        for (offset, byte) in self.bytes().enumerate() {
            if window.len() == pattern.len() {
                window.pop_front();
            }
            window.push_back(byte);
            if window.len() == pattern.len() && window.iter().eq(pattern.iter()) {
                return Some(offset + 1 - pattern.len());
            }
        }
        None
    }

    /// Copies the first `n` bytes, or returns `None` if fewer are buffered.
    pub fn peek_prefix(&self, n: usize) -> Option<Vec<u8>> {
        if n > self.len {
            return None;
        }
        Some(self.bytes().take(n).collect())
    }

    /// Unconsumed part of the front segment.
    pub fn front(&self) -> Option<&[u8]> {
        self.segments.front().map(Segment::remaining)
    }

    /// Marks `n` bytes at the front as consumed, dropping drained segments.
    ///
    /// `n` is clamped to the queue length.
    pub fn consume(&mut self, n: usize) {
        let mut left = n.min(self.len);
        self.len -= left;

        while left > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            let available = front.data.len() - front.pos;
            if left >= available {
                left -= available;
                self.segments.pop_front();
            } else {
                front.pos += left;
                left = 0;
            }
        }
    }

    /// Consumes exactly the first `n` bytes into one contiguous buffer.
    ///
    /// Returns `Ok(None)` without consuming when fewer than `n` bytes are
    /// buffered.
    pub fn take(&mut self, n: usize) -> QueueResult<Option<Vec<u8>>> {
        if n > self.len {
            return Ok(None);
        }

        let mut out = Vec::new();
        out.try_reserve_exact(n)?;
        while out.len() < n {
            let Some(chunk) = self.front() else {
                break;
            };
            let wanted = (n - out.len()).min(chunk.len());
            out.extend_from_slice(&chunk[..wanted]);
            self.consume(wanted);
        }
        Ok(Some(out))
    }

    /// Concatenates and consumes every buffered byte.
    pub fn drain_all(&mut self) -> QueueResult<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.len)?;
        for segment in self.segments.drain(..) {
            out.extend_from_slice(segment.remaining());
        }
        self.len = 0;
        Ok(out)
    }

    /// Drops every segment.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.len = 0;
    }

    fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.segments
            .iter()
            .flat_map(|segment| segment.remaining().iter().copied())
    }
}
