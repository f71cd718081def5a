//! Device sessions.
//!
//! A session wraps one byte-stream device and carries everything the server
//! tracks for it: the line framer, the parser position within the current
//! line, the pending final response, response framing and the unsolicited
//! queue.

use std::io;

use atserver_protocol::{
    FinalResult, LineFramer, ResponseFormatter, ResponseState, ERROR_RESPONSE,
};
use tracing::{error, trace};

use crate::config::ServerConfig;
use crate::metrics::metric_defs;
use crate::parser::CommandParser;
use crate::pool::ResponseQueue;
use crate::types::ClientId;

/// Byte-stream device the server talks to.
///
/// The server never blocks on a device. The event loop calls
/// [`AtServer::on_readable`](crate::AtServer::on_readable) when the device has
/// data, and only while it is monitored.
pub trait DeviceIo {
    /// Read available bytes. `Ok(0)` or [`io::ErrorKind::WouldBlock`] means nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Start reporting read readiness.
    fn add_monitoring(&mut self) -> io::Result<()>;

    /// Stop reporting read readiness.
    fn remove_monitoring(&mut self) -> io::Result<()>;

    /// Release the device.
    fn close(&mut self) -> io::Result<()>;
}

/// Final response stored by the last sub-command of the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FinalResponse {
    pub(crate) result: FinalResult,
    pub(crate) custom: Option<String>,
}

/// Per-device state.
pub struct DeviceSession {
    io: Box<dyn DeviceIo>,
    owner: ClientId,
    pub(crate) framer: LineFramer,
    pub(crate) parser: CommandParser,
    pub(crate) formatter: ResponseFormatter,
    pub(crate) final_rsp: FinalResponse,
    pub(crate) unsolicited: ResponseQueue,
    /// A line is being worked on; new lines are refused.
    pub(crate) processing: bool,
    pub(crate) suspended: bool,
    pub(crate) monitored: bool,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("owner", &self.owner)
            .field("framer", &self.framer.state())
            .field("processing", &self.processing)
            .field("suspended", &self.suspended)
            .field("monitored", &self.monitored)
            .field("queued_unsolicited", &self.unsolicited.len())
            .finish()
    }
}

impl DeviceSession {
    pub(crate) fn new(io: Box<dyn DeviceIo>, owner: ClientId, config: &ServerConfig) -> Self {
        DeviceSession {
            io,
            owner,
            framer: LineFramer::with_max_line_length(config.max_line_length),
            parser: CommandParser::new(),
            formatter: ResponseFormatter::new(),
            final_rsp: FinalResponse::default(),
            unsolicited: ResponseQueue::new(config.max_unsolicited_queue),
            processing: false,
            suspended: false,
            monitored: true,
        }
    }

    pub fn owner(&self) -> ClientId {
        self.owner
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    /// Number of unsolicited responses waiting for the current line to finish.
    pub fn queued_unsolicited(&self) -> usize {
        self.unsolicited.len()
    }

    /// Whether unsolicited text can be written right away.
    pub(crate) fn is_idle(&self) -> bool {
        !self.processing && !self.suspended
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io.read(buf)
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        trace!("tx {:?}", String::from_utf8_lossy(data));
        self.io.write(data)
    }

    /// Write a bare ERROR outside of any response cycle.
    pub(crate) fn write_error(&mut self) {
        if let Err(e) = self.write(ERROR_RESPONSE) {
            error!("Failed to write ERROR: {}", e);
        }
    }

    /// Format and write an informational text.
    pub(crate) fn send_text(&mut self, state: ResponseState, text: &str) -> io::Result<()> {
        let bytes = self.formatter.format_text(state, text);
        self.write(&bytes)
    }

    /// Write the stored final response, end the line, then flush queued
    /// unsolicited responses in arrival order.
    pub(crate) fn write_final(&mut self) {
        let FinalResponse { result, custom } = std::mem::take(&mut self.final_rsp);
        let bytes = self.formatter.format_final(result, custom.as_deref());
        if let Err(e) = self.write(&bytes) {
            error!("Failed to write final response: {}", e);
        }

        match result {
            FinalResult::Ok => metrics::counter!(metric_defs::FINAL_OK.name).increment(1),
            FinalResult::Error => metrics::counter!(metric_defs::FINAL_ERROR.name).increment(1),
        }

        self.processing = false;
        self.parser.reset();

        self.flush_unsolicited();
    }

    /// Deliver queued unsolicited responses.
    pub(crate) fn flush_unsolicited(&mut self) {
        while let Some(text) = self.unsolicited.pop() {
            match self.send_text(ResponseState::Final, &text) {
                Ok(()) => metrics::counter!(metric_defs::UNSOLICITED_SENT.name).increment(1),
                Err(e) => error!("Failed to write unsolicited response: {}", e),
            }
        }
    }

    pub(crate) fn add_monitoring(&mut self) -> io::Result<()> {
        self.io.add_monitoring()?;
        self.monitored = true;
        Ok(())
    }

    pub(crate) fn remove_monitoring(&mut self) -> io::Result<()> {
        self.io.remove_monitoring()?;
        self.monitored = false;
        Ok(())
    }

    /// Stop monitoring and close the device. Queued unsolicited text is discarded.
    pub(crate) fn shutdown(&mut self) -> io::Result<()> {
        self.unsolicited.clear();
        if self.monitored {
            if let Err(e) = self.remove_monitoring() {
                error!("Failed to stop monitoring: {}", e);
            }
        }
        self.io.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackDevice;

    fn session() -> (DeviceSession, crate::loopback::LoopbackHandle) {
        let (device, handle) = LoopbackDevice::new();
        let session = DeviceSession::new(Box::new(device), ClientId(1), &ServerConfig::default());
        (session, handle)
    }

    #[test]
    fn test_write_final_flushes_queue() {
        let (mut session, handle) = session();
        session.processing = true;
        session.unsolicited.push("RING".into()).unwrap();
        session.unsolicited.push("+CREG: 1".into()).unwrap();

        session.write_final();

        assert_eq!(
            handle.take_output_string(),
            "\r\nOK\r\n\r\nRING\r\n\r\n+CREG: 1\r\n"
        );
        assert!(!session.is_processing());
        assert_eq!(session.queued_unsolicited(), 0);
    }

    #[test]
    fn test_write_final_custom_text() {
        let (mut session, handle) = session();
        session.final_rsp = FinalResponse {
            result: FinalResult::Error,
            custom: Some("+CME ERROR: 3".into()),
        };
        session.write_final();
        assert_eq!(handle.take_output_string(), "\r\n+CME ERROR: 3\r\n");
        // The stored final is consumed.
        assert_eq!(session.final_rsp, FinalResponse::default());
    }

    #[test]
    fn test_shutdown_discards_queue() {
        let (mut session, handle) = session();
        session.unsolicited.push("RING".into()).unwrap();
        session.shutdown().unwrap();
        assert!(handle.is_closed());
        assert!(!handle.is_monitored());
        assert_eq!(handle.take_output_string(), "");
    }
}
