//! Response sequencing.
//!
//! Handlers answer through these methods. Intermediate text goes out at once,
//! framed per the device's response cycle. A successful final response does
//! not reach the wire until every sub-command on the line has answered; a
//! failed one ends the line immediately. Unsolicited text is held back while
//! the device is busy and flushed right after the line's final response.

use atserver_protocol::{truncate_response, FinalResult, ResponseState};
use tracing::{debug, warn};

use crate::error::{AtError, AtResult};
use crate::metrics::metric_defs;
use crate::server::AtServer;
use crate::session::{DeviceSession, FinalResponse};
use crate::types::{AvailableDevice, CommandRef, DeviceRef};

impl AtServer {
    /// Device of the invocation `command` is processing.
    fn processing_device(&self, command: CommandRef) -> AtResult<DeviceRef> {
        let entry = self.registry.get(command)?;
        match (entry.processing, entry.device) {
            (true, Some(device)) => Ok(device),
            _ => Err(AtError::NotProcessing(entry.name.clone())),
        }
    }

    /// Send an informational line for the command in flight.
    pub fn send_intermediate_response(&mut self, command: CommandRef, text: &str) -> AtResult<()> {
        let device = self.processing_device(command)?;
        let max = self.config.max_response_length;

        let session = self.session_mut(device)?;
        if !session.processing {
            warn!("{}: no line in progress", device);
            return Err(AtError::NotProcessing(String::from_utf8_lossy(session.parser.line()).into_owned()));
        }

        session.send_text(ResponseState::Intermediate, truncate_response(text, max))?;
        Ok(())
    }

    /// Complete the invocation of `command`.
    ///
    /// `custom` replaces the default `OK`/`ERROR` text. On success the next
    /// sub-command of the line is resolved; the final text is written once the
    /// line is exhausted. On failure the line ends here.
    pub fn send_final_response(
        &mut self,
        command: CommandRef,
        result: FinalResult,
        custom: Option<&str>,
    ) -> AtResult<()> {
        let device = self.processing_device(command)?;
        self.registry.release(command);

        let max = self.config.max_response_length;
        let session = self.session_mut(device)?;
        session.final_rsp = FinalResponse {
            result,
            custom: custom.map(|text| truncate_response(text, max).to_string()),
        };

        debug!("{}: final response {}", device, result);
        if result.is_ok() {
            self.advance_line(device);
        } else {
            session.write_final();
        }
        Ok(())
    }

    /// Send text that belongs to no command, to one device or to all of them.
    ///
    /// A device that is busy or suspended keeps the text until its current
    /// line ends. With [`AvailableDevice::AllDevices`] every device is tried;
    /// the first error is returned.
    pub fn send_unsolicited_response(&mut self, text: &str, target: AvailableDevice) -> AtResult<()> {
        let text = truncate_response(text, self.config.max_response_length);

        match target {
            AvailableDevice::Specific(device) => deliver_unsolicited(self.session_mut(device)?, text),
            AvailableDevice::AllDevices => {
                let mut result = Ok(());
                for (key, session) in self.devices.iter_mut() {
                    if let Err(e) = deliver_unsolicited(session, text) {
                        warn!("Unsolicited response not delivered to {}: {}", DeviceRef(key), e);
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
                result
            }
        }
    }
}

fn deliver_unsolicited(session: &mut DeviceSession, text: &str) -> AtResult<()> {
    if session.is_idle() {
        session.send_text(ResponseState::Unsolicited, text)?;
        metrics::counter!(metric_defs::UNSOLICITED_SENT.name).increment(1);
    } else {
        session.unsolicited.push(text.to_string())?;
        metrics::counter!(metric_defs::UNSOLICITED_QUEUED.name).increment(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::dispatch::Invocation;
    use crate::loopback::{LoopbackDevice, LoopbackHandle};
    use crate::types::ClientId;

    fn open(server: &mut AtServer) -> (DeviceRef, LoopbackHandle) {
        let (device, handle) = LoopbackDevice::new();
        let dev = server.open(ClientId(1), Box::new(device)).unwrap();
        (dev, handle)
    }

    fn register_silent(server: &mut AtServer, name: &str) -> CommandRef {
        let cmd = server.create_command(ClientId(1), name).unwrap();
        server
            .add_command_handler(cmd, |_: &mut AtServer, _: Invocation| {})
            .unwrap();
        cmd
    }

    fn start(server: &mut AtServer, dev: DeviceRef, handle: &LoopbackHandle, line: &str) {
        handle.feed_line(line);
        server.on_readable(dev).unwrap();
        server.run_pending();
    }

    #[test]
    fn test_intermediate_framing() {
        let mut server = AtServer::default();
        let cmd = register_silent(&mut server, "AT+LIST");
        let (dev, handle) = open(&mut server);
        start(&mut server, dev, &handle, "AT+LIST");

        server.send_intermediate_response(cmd, "+LIST: 1").unwrap();
        server.send_intermediate_response(cmd, "+LIST: 2").unwrap();
        server.send_final_response(cmd, FinalResult::Ok, None).unwrap();

        assert_eq!(
            handle.take_output_string(),
            "\r\n+LIST: 1\r\n+LIST: 2\r\n\r\nOK\r\n"
        );
    }

    #[test]
    fn test_responses_require_processing() {
        let mut server = AtServer::default();
        let cmd = register_silent(&mut server, "AT+LIST");
        assert!(matches!(
            server.send_intermediate_response(cmd, "x"),
            Err(AtError::NotProcessing(_))
        ));
        assert!(matches!(
            server.send_final_response(cmd, FinalResult::Ok, None),
            Err(AtError::NotProcessing(_))
        ));
    }

    #[test]
    fn test_custom_final_text() {
        let mut server = AtServer::default();
        let cmd = register_silent(&mut server, "AT+FAIL");
        let (dev, handle) = open(&mut server);
        start(&mut server, dev, &handle, "AT+FAIL");

        server
            .send_final_response(cmd, FinalResult::Error, Some("+CME ERROR: 4"))
            .unwrap();
        assert_eq!(handle.take_output_string(), "\r\n+CME ERROR: 4\r\n");
        assert!(!server.is_processing(dev).unwrap());
    }

    #[test]
    fn test_unsolicited_idle_is_immediate() {
        let mut server = AtServer::default();
        let (dev, handle) = open(&mut server);
        server
            .send_unsolicited_response("RING", AvailableDevice::Specific(dev))
            .unwrap();
        assert_eq!(handle.take_output_string(), "\r\nRING\r\n");
    }

    #[test]
    fn test_unsolicited_broadcast() {
        let mut server = AtServer::default();
        let (_a, handle_a) = open(&mut server);
        let (_b, handle_b) = open(&mut server);
        server
            .send_unsolicited_response("+CREG: 1", AvailableDevice::AllDevices)
            .unwrap();
        assert_eq!(handle_a.take_output_string(), "\r\n+CREG: 1\r\n");
        assert_eq!(handle_b.take_output_string(), "\r\n+CREG: 1\r\n");
    }

    #[test]
    fn test_unsolicited_queue_bound() {
        let config = ServerConfig {
            max_unsolicited_queue: 1,
            ..Default::default()
        };
        let mut server = AtServer::new(config).unwrap();
        register_silent(&mut server, "AT+SLOW");
        let (dev, handle) = open(&mut server);
        start(&mut server, dev, &handle, "AT+SLOW");

        let target = AvailableDevice::Specific(dev);
        server.send_unsolicited_response("one", target).unwrap();
        assert!(matches!(
            server.send_unsolicited_response("two", target),
            Err(AtError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_text_truncated() {
        let config = ServerConfig {
            max_response_length: 4,
            ..Default::default()
        };
        let mut server = AtServer::new(config).unwrap();
        let (dev, handle) = open(&mut server);
        server
            .send_unsolicited_response("RINGING", AvailableDevice::Specific(dev))
            .unwrap();
        assert_eq!(handle.take_output_string(), "\r\nRING\r\n");
    }
}
