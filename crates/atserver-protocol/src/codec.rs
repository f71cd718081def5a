//! Line framing for AT command input.
//!
//! A device delivers an unstructured byte stream. The framer scans it for the
//! case-insensitive `AT` prefix, accumulates everything up to the carriage
//! return, and hands back the complete line (prefix included, CR stripped).
//! Bytes outside of an `AT...<CR>` line are discarded.

use bytes::{BufMut, BytesMut};

use crate::constants::{AT_TOKEN_CR, MAX_LINE_LENGTH};

/// Where the framer is within the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Waiting for `A`/`a`.
    SeekA,
    /// `A` seen, waiting for `T`/`t`.
    SeekT,
    /// Inside a line, waiting for the carriage return.
    SeekCr,
}

/// Output of the framer for one input byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete command line, `AT` prefix included, CR stripped.
    Line(Vec<u8>),
    /// The pending line reached the maximum length. It was discarded and the
    /// framer restarted from [`FramerState::SeekA`].
    Overflow,
}

/// Incremental `AT...<CR>` line framer.
///
/// One framer belongs to one device session. Feed it bytes in arrival order;
/// it never buffers more than `max_line_length - 1` bytes.
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes of the line being captured.
    buffer: BytesMut,
    /// Current scan state.
    state: FramerState,
    /// Overflow threshold.
    max_line_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a framer that overflows once a pending line reaches `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        let max_line_length = max_line_length.max(3);
        LineFramer {
            buffer: BytesMut::with_capacity(max_line_length),
            state: FramerState::SeekA,
            max_line_length,
        }
    }

    /// Current scan state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Overflow threshold.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Number of bytes of the pending line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// How many more bytes the pending line may grow before it overflows.
    pub fn remaining(&self) -> usize {
        self.max_line_length.saturating_sub(self.buffer.len())
    }

    /// Drop any partial line and restart the `AT` search.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = FramerState::SeekA;
    }

    /// Feed one byte.
    pub fn push_byte(&mut self, byte: u8) -> Option<FrameEvent> {
        match self.state {
            FramerState::SeekA => {
                if byte.eq_ignore_ascii_case(&b'a') {
                    self.buffer.clear();
                    self.buffer.put_u8(byte);
                    self.state = FramerState::SeekT;
                }
                None
            }
            FramerState::SeekT => {
                if byte.eq_ignore_ascii_case(&b't') {
                    self.buffer.put_u8(byte);
                    self.state = FramerState::SeekCr;
                } else {
                    self.reset();
                }
                None
            }
            FramerState::SeekCr => {
                if byte == AT_TOKEN_CR {
                    let line = self.buffer.split().to_vec();
                    self.state = FramerState::SeekA;
                    return Some(FrameEvent::Line(line));
                }

                self.buffer.put_u8(byte);
                if self.buffer.len() >= self.max_line_length {
                    log::warn!(
                        "line exceeds {} bytes, discarding",
                        self.max_line_length
                    );
                    self.reset();
                    return Some(FrameEvent::Overflow);
                }
                None
            }
        }
    }

    /// Feed a chunk of bytes and collect every event it produces.
    pub fn push(&mut self, data: &[u8]) -> Vec<FrameEvent> {
        data.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// Encode a command line for transmission to a server.
    ///
    /// Appends the carriage return terminator.
    pub fn encode_line(line: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(AT_TOKEN_CR);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_line() {
        let mut framer = LineFramer::new();
        let events = framer.push(b"AT+CSQ?\r");
        assert_eq!(events, vec![FrameEvent::Line(b"AT+CSQ?".to_vec())]);
        assert_eq!(framer.state(), FramerState::SeekA);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_prefix_case_insensitive() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"aT\r"), vec![FrameEvent::Line(b"aT".to_vec())]);
        assert_eq!(framer.push(b"At&k3\r"), vec![FrameEvent::Line(b"At&k3".to_vec())]);
    }

    #[test]
    fn test_noise_before_prefix_is_dropped() {
        let mut framer = LineFramer::new();
        let events = framer.push(b"\n\r xyz ATI\r");
        assert_eq!(events, vec![FrameEvent::Line(b"ATI".to_vec())]);
    }

    #[test]
    fn test_mismatch_after_a_resets() {
        let mut framer = LineFramer::new();
        framer.push(b"AX");
        assert_eq!(framer.state(), FramerState::SeekA);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_partial_line() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"AT+C").is_empty());
        assert_eq!(framer.state(), FramerState::SeekCr);
        assert_eq!(framer.buffered_len(), 4);

        let events = framer.push(b"GMI\r");
        assert_eq!(events, vec![FrameEvent::Line(b"AT+CGMI".to_vec())]);
    }

    #[test]
    fn test_crlf_terminated_lines() {
        let mut framer = LineFramer::new();
        let events = framer.push(b"ATE0\r\nATI\r\n");
        assert_eq!(
            events,
            vec![
                FrameEvent::Line(b"ATE0".to_vec()),
                FrameEvent::Line(b"ATI".to_vec()),
            ]
        );
    }

    #[test]
    fn test_overflow_resets() {
        let mut framer = LineFramer::with_max_line_length(8);
        let events = framer.push(b"AT+ABCDEFGH\r");
        assert_eq!(events, vec![FrameEvent::Overflow]);
        assert_eq!(framer.state(), FramerState::SeekA);

        // The framer is usable again afterwards.
        assert_eq!(framer.push(b"ATI\r"), vec![FrameEvent::Line(b"ATI".to_vec())]);
    }

    #[test]
    fn test_longest_line_that_fits() {
        let mut framer = LineFramer::with_max_line_length(8);
        let events = framer.push(b"AT+ABCD\r");
        assert_eq!(events, vec![FrameEvent::Line(b"AT+ABCD".to_vec())]);
    }

    #[test]
    fn test_remaining() {
        let mut framer = LineFramer::with_max_line_length(10);
        framer.push(b"AT+");
        assert_eq!(framer.remaining(), 7);
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(LineFramer::encode_line("AT+CSQ?"), b"AT+CSQ?\r");
    }
}
