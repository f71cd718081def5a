//! In-memory device for tests, benchmarks and demos.
//!
//! ```rust
//! use atserver::{AtServer, ClientId, LoopbackDevice};
//!
//! let mut server = AtServer::default();
//! let (device, handle) = LoopbackDevice::new();
//! let dev = server.open(ClientId(1), Box::new(device)).unwrap();
//!
//! handle.feed(b"AT+NOPE\r");
//! server.on_readable(dev).unwrap();
//! assert_eq!(handle.take_output_string(), "\r\nERROR\r\n");
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::session::DeviceIo;

#[derive(Debug, Default)]
struct LoopbackState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    monitored: bool,
    closed: bool,
    fail_close: bool,
    fail_monitoring: bool,
}

/// Device half handed to the server.
#[derive(Debug)]
pub struct LoopbackDevice {
    state: Rc<RefCell<LoopbackState>>,
}

/// Test half: feeds input and inspects what the server wrote.
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Rc<RefCell<LoopbackState>>,
}

impl LoopbackDevice {
    /// Create a connected device/handle pair.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (LoopbackDevice, LoopbackHandle) {
        let state = Rc::new(RefCell::new(LoopbackState::default()));
        (
            LoopbackDevice {
                state: state.clone(),
            },
            LoopbackHandle { state },
        )
    }
}

impl DeviceIo for LoopbackDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device closed"));
        }
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device closed"));
        }
        state.output.extend_from_slice(data);
        Ok(())
    }

    fn add_monitoring(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_monitoring {
            return Err(io::Error::new(io::ErrorKind::Other, "monitoring refused"));
        }
        state.monitored = true;
        Ok(())
    }

    fn remove_monitoring(&mut self) -> io::Result<()> {
        self.state.borrow_mut().monitored = false;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.closed = true;
        if state.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

impl LoopbackHandle {
    /// Queue bytes for the server to read.
    pub fn feed(&self, data: &[u8]) {
        self.state.borrow_mut().input.extend(data.iter().copied());
    }

    /// Queue a command line, appending the carriage return.
    pub fn feed_line(&self, line: &str) {
        self.feed(&atserver_protocol::LineFramer::encode_line(line));
    }

    /// Discard unread input, as a data-mode consumer would while the session is suspended.
    pub fn drain_input(&self) -> Vec<u8> {
        self.state.borrow_mut().input.drain(..).collect()
    }

    /// Take everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().output)
    }

    /// Take everything written so far, as text.
    pub fn take_output_string(&self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }

    pub fn is_monitored(&self) -> bool {
        self.state.borrow().monitored
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Make the next `close` report an error.
    pub fn fail_close(&self) {
        self.state.borrow_mut().fail_close = true;
    }

    /// Make `add_monitoring` fail (or succeed again).
    pub fn fail_monitoring(&self, fail: bool) {
        self.state.borrow_mut().fail_monitoring = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let (mut device, handle) = LoopbackDevice::new();
        handle.feed(b"ATI\r");

        let mut buf = [0u8; 2];
        assert_eq!(device.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"AT");
        assert_eq!(device.read(&mut buf).unwrap(), 2);
        assert_eq!(device.read(&mut buf).unwrap(), 0);

        device.write(b"\r\nOK\r\n").unwrap();
        assert_eq!(handle.take_output(), b"\r\nOK\r\n");
        assert!(handle.take_output().is_empty());
    }

    #[test]
    fn test_close() {
        let (mut device, handle) = LoopbackDevice::new();
        handle.fail_close();
        assert!(device.close().is_err());
        assert!(handle.is_closed());
        assert!(device.write(b"x").is_err());
    }
}
