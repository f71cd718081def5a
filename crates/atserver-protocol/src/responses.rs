//! Response formatting.
//!
//! Every byte the server writes to a device goes through a [`ResponseFormatter`].
//!
//! | Kind                                      | Wire form           |
//! |-------------------------------------------|---------------------|
//! | OK                                        | `\r\nOK\r\n`        |
//! | ERROR                                     | `\r\nERROR\r\n`     |
//! | First informational text of a cycle       | `\r\n<text>\r\n`    |
//! | Further intermediate text in the cycle    | `<text>\r\n`        |
//!
//! A cycle starts when a command is resolved and ends with its final response.
//! Unsolicited texts and custom final texts always use the framed form.

use std::fmt;

use crate::constants::{CRLF, ERROR_RESPONSE, OK_RESPONSE};

/// Outcome reported by a command handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalResult {
    /// Command succeeded.
    #[default]
    Ok,
    /// Command failed.
    Error,
}

impl FinalResult {
    /// Whether this is [`FinalResult::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, FinalResult::Ok)
    }

    /// Default wire form.
    pub fn wire(&self) -> &'static [u8] {
        match self {
            FinalResult::Ok => OK_RESPONSE,
            FinalResult::Error => ERROR_RESPONSE,
        }
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalResult::Ok => f.write_str("OK"),
            FinalResult::Error => f.write_str("ERROR"),
        }
    }
}

/// Which stream the last text was written on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Text belonging to the command in flight.
    Intermediate,
    /// Text independent of any command.
    Unsolicited,
    /// Final response, and unsolicited texts flushed right after it.
    Final,
}

/// Per-device response framing state.
#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    state: ResponseState,
    first_intermediate: bool,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseFormatter {
    /// Create a formatter at the start of a cycle.
    pub fn new() -> Self {
        ResponseFormatter {
            state: ResponseState::Intermediate,
            first_intermediate: true,
        }
    }

    /// Stream of the last formatted text.
    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Whether the next intermediate text opens the cycle.
    pub fn is_first_intermediate(&self) -> bool {
        self.first_intermediate
    }

    /// Start a new cycle: the next intermediate text gets the leading CRLF.
    pub fn begin_cycle(&mut self) {
        self.first_intermediate = true;
    }

    /// Format an informational text for `state`.
    pub fn format_text(&mut self, state: ResponseState, text: &str) -> Vec<u8> {
        self.state = state;

        let framed = match state {
            ResponseState::Final | ResponseState::Unsolicited => true,
            ResponseState::Intermediate => self.first_intermediate,
        };

        let mut out = Vec::with_capacity(text.len() + 2 * CRLF.len());
        if framed {
            out.extend_from_slice(CRLF);
            self.first_intermediate = false;
        }
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(CRLF);
        out
    }

    /// Format a final response. A custom text replaces the default OK/ERROR form.
    pub fn format_final(&mut self, result: FinalResult, custom: Option<&str>) -> Vec<u8> {
        match custom {
            Some(text) => self.format_text(ResponseState::Final, text),
            None => {
                self.state = ResponseState::Final;
                result.wire().to_vec()
            }
        }
    }
}

/// Cut `text` to at most `max` bytes without splitting a character.
pub fn truncate_response(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_defaults() {
        let mut fmt = ResponseFormatter::new();
        assert_eq!(fmt.format_final(FinalResult::Ok, None), b"\r\nOK\r\n");
        assert_eq!(fmt.format_final(FinalResult::Error, None), b"\r\nERROR\r\n");
        assert_eq!(fmt.state(), ResponseState::Final);
    }

    #[test]
    fn test_custom_final() {
        let mut fmt = ResponseFormatter::new();
        assert_eq!(
            fmt.format_final(FinalResult::Error, Some("+CME ERROR: 10")),
            b"\r\n+CME ERROR: 10\r\n"
        );
    }

    #[test]
    fn test_intermediate_cycle() {
        let mut fmt = ResponseFormatter::new();
        fmt.begin_cycle();
        assert_eq!(
            fmt.format_text(ResponseState::Intermediate, "+CSQ: 15,99"),
            b"\r\n+CSQ: 15,99\r\n"
        );
        assert_eq!(fmt.format_text(ResponseState::Intermediate, "line 2"), b"line 2\r\n");
        assert!(!fmt.is_first_intermediate());

        fmt.begin_cycle();
        assert_eq!(fmt.format_text(ResponseState::Intermediate, "again"), b"\r\nagain\r\n");
    }

    #[test]
    fn test_unsolicited_always_framed() {
        let mut fmt = ResponseFormatter::new();
        fmt.format_text(ResponseState::Intermediate, "first");
        assert_eq!(fmt.format_text(ResponseState::Unsolicited, "RING"), b"\r\nRING\r\n");
        assert_eq!(fmt.format_text(ResponseState::Unsolicited, "RING"), b"\r\nRING\r\n");
    }

    #[test]
    fn test_truncate_response() {
        assert_eq!(truncate_response("hello", 10), "hello");
        assert_eq!(truncate_response("hello", 3), "hel");
        // 'é' is two bytes; never split it.
        assert_eq!(truncate_response("aé", 2), "a");
    }
}
