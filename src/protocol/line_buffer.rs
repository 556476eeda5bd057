//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so completed lines are split off without copying.
//! Incoming bytes are appended, then every complete terminator-delimited
//! line is extracted; whatever follows the last terminator stays buffered
//! for the next push.
//!
//! # Example
//!
//! ```
//! use linewire::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new(b"\n");
//!
//! let lines = buffer.push(b"a\nb\nc").unwrap();
//! assert_eq!(lines, vec![&b"a"[..], &b"b"[..]]);
//! assert_eq!(buffer.remainder(), b"c");
//!
//! let lines = buffer.push(b"\n").unwrap();
//! assert_eq!(lines, vec![&b"c"[..]]);
//! assert!(buffer.is_empty());
//! ```

use bytes::{Buf, Bytes, BytesMut};

use super::DEFAULT_MAX_LINE_LENGTH;
use crate::error::{LinewireError, Result};

/// Buffer for accumulating incoming bytes and extracting complete lines.
pub struct LineBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Line terminator, never empty.
    terminator: Bytes,
    /// Bytes at the front of `buffer` already known not to start a terminator.
    scanned: usize,
    /// Maximum length of a buffered partial line.
    max_line_length: usize,
}

impl LineBuffer {
    /// Create a new line buffer with the default max line length.
    ///
    /// The terminator must not be empty; [`StreamConfig::validate`](crate::StreamConfig::validate)
    /// guarantees this for buffers created by a stream.
    pub fn new(terminator: &[u8]) -> Self {
        Self::with_max_line_length(terminator, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line buffer with a custom max line length.
    pub fn with_max_line_length(terminator: &[u8], max_line_length: usize) -> Self {
        debug_assert!(!terminator.is_empty(), "terminator must not be empty");
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            terminator: Bytes::copy_from_slice(terminator),
            scanned: 0,
            max_line_length,
        }
    }

    /// Push data into the buffer and extract all complete lines.
    ///
    /// Returned lines do not include the terminator. If data ends
    /// mid-line, the partial line is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the buffered partial line grows beyond
    /// the max line length.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(line) = self.try_extract_one() {
            lines.push(line);
        }

        let line_length = self.buffer.len() - self.partial_terminator_len();
        if line_length > self.max_line_length {
            return Err(LinewireError::Protocol(format!(
                "Line length {} exceeds maximum {}",
                line_length, self.max_line_length
            )));
        }

        Ok(lines)
    }

    /// Length of the terminator prefix the buffer ends with, if any.
    fn partial_terminator_len(&self) -> usize {
        (1..self.terminator.len())
            .rev()
            .find(|&n| self.buffer.ends_with(&self.terminator[..n]))
            .unwrap_or(0)
    }

    /// Try to extract a single line from the front of the buffer.
    fn try_extract_one(&mut self) -> Option<Bytes> {
        let position = self.find_terminator()?;

        let line = self.buffer.split_to(position).freeze();
        self.buffer.advance(self.terminator.len());
        self.scanned = 0;

        Some(line)
    }

    /// Offset of the first terminator, resuming where the last scan stopped.
    fn find_terminator(&mut self) -> Option<usize> {
        let term = &self.terminator[..];
        let start = self.scanned;

        let found = if term.len() == 1 {
            self.buffer[start..]
                .iter()
                .position(|&b| b == term[0])
                .map(|i| start + i)
        } else {
            self.buffer[start..]
                .windows(term.len())
                .position(|w| w == term)
                .map(|i| start + i)
        };

        if found.is_none() {
            // A terminator may still straddle the end of the buffer.
            self.scanned = self.buffer.len().saturating_sub(term.len() - 1);
        }

        found
    }

    /// The buffered partial line.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }

    /// The terminator this buffer splits on.
    pub fn terminator(&self) -> &[u8] {
        &self.terminator
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any buffered partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}
