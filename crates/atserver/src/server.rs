//! The server: command registration, device sessions and the read path.

use std::io;

use atserver_protocol::{CommandType, FinalResult, FrameEvent};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{CommandHandler, DispatchQueue, HandlerSlot, PendingDispatch};
use crate::error::{AtError, AtResult};
use crate::metrics::metric_defs;
use crate::parser::ParseOutcome;
use crate::registry::{CommandRegistry, RegisteredCommand};
use crate::session::{DeviceIo, DeviceSession, FinalResponse};
use crate::slots::SlotTable;
use crate::types::{AvailableDevice, ClientId, CommandRef, DeviceRef};

/// AT command server.
///
/// Owns the command registry and every open device session. All methods run
/// on the caller's thread; drive it from a single event loop:
///
/// 1. call [`on_readable`](Self::on_readable) when a device has data,
/// 2. call [`run_pending`](Self::run_pending) to run the handlers of resolved commands.
pub struct AtServer {
    pub(crate) config: ServerConfig,
    pub(crate) registry: CommandRegistry,
    pub(crate) devices: SlotTable<DeviceSession>,
    pub(crate) pending: DispatchQueue,
    pub(crate) dispatching: bool,
}

impl Default for AtServer {
    fn default() -> Self {
        Self::build(ServerConfig::default())
    }
}

impl std::fmt::Debug for AtServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtServer")
            .field("commands", &self.registry.len())
            .field("devices", &self.devices.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl AtServer {
    /// Create a server after validating `config`.
    pub fn new(config: ServerConfig) -> AtResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ServerConfig) -> Self {
        AtServer {
            registry: CommandRegistry::new(&config),
            devices: SlotTable::new(),
            pending: DispatchQueue::new(),
            dispatching: false,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn command_count(&self) -> usize {
        self.registry.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub(crate) fn session(&self, device: DeviceRef) -> AtResult<&DeviceSession> {
        self.devices.get(device.0).ok_or(AtError::InvalidHandle)
    }

    pub(crate) fn session_mut(&mut self, device: DeviceRef) -> AtResult<&mut DeviceSession> {
        self.devices.get_mut(device.0).ok_or(AtError::InvalidHandle)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Register a command by its full name (`"AT+CSQ"`, `"ATI"`, `"AT&K3"`).
    ///
    /// Registering an existing name returns the existing handle.
    pub fn create_command(&mut self, owner: ClientId, name: &str) -> AtResult<CommandRef> {
        self.registry.create(owner, name)
    }

    /// Unregister a command. Fails with [`AtError::Busy`] while it is processing.
    pub fn delete_command(&mut self, command: CommandRef) -> AtResult<()> {
        self.registry.remove(command).map(drop)
    }

    /// Find a registered command by name.
    pub fn find_command(&self, name: &str) -> Option<CommandRef> {
        self.registry.lookup(name)
    }

    /// Restrict the devices on which `command` resolves.
    pub fn set_command_device(
        &mut self,
        command: CommandRef,
        availability: AvailableDevice,
    ) -> AtResult<()> {
        if let AvailableDevice::Specific(device) = availability {
            self.session(device)?;
        }
        self.registry.get_mut(command)?.availability = availability;
        Ok(())
    }

    /// Attach the handler run for each invocation of `command`.
    pub fn add_command_handler<H>(&mut self, command: CommandRef, handler: H) -> AtResult<()>
    where
        H: CommandHandler + 'static,
    {
        let entry = self.registry.get_mut(command)?;
        if entry.handler.is_attached() {
            return Err(AtError::HandlerExists(entry.name.clone()));
        }
        debug!("Add handler to: {}", entry.name);
        entry.handler = HandlerSlot::Installed(Box::new(handler));
        Ok(())
    }

    /// Detach the handler of `command`. Another one may be added afterwards.
    pub fn remove_command_handler(&mut self, command: CommandRef) -> AtResult<()> {
        let entry = self.registry.get_mut(command)?;
        entry.handler = HandlerSlot::Empty;
        Ok(())
    }

    fn command(&self, command: CommandRef) -> AtResult<&RegisteredCommand> {
        self.registry.get(command)
    }

    /// Parameter `index` of the current invocation.
    pub fn parameter(&self, command: CommandRef, index: usize) -> AtResult<&str> {
        self.command(command)?.params.get(index)
    }

    /// All parameters of the current invocation.
    pub fn parameters(&self, command: CommandRef) -> AtResult<&[String]> {
        Ok(self.command(command)?.parameters())
    }

    pub fn parameter_count(&self, command: CommandRef) -> AtResult<usize> {
        Ok(self.command(command)?.params.len())
    }

    pub fn command_name(&self, command: CommandRef) -> AtResult<&str> {
        Ok(self.command(command)?.name())
    }

    /// Type of the current invocation.
    pub fn command_type(&self, command: CommandRef) -> AtResult<CommandType> {
        Ok(self.command(command)?.kind())
    }

    pub fn is_command_processing(&self, command: CommandRef) -> AtResult<bool> {
        Ok(self.command(command)?.is_processing())
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Start serving a device.
    pub fn open(&mut self, owner: ClientId, mut io: Box<dyn DeviceIo>) -> AtResult<DeviceRef> {
        if self.devices.len() >= self.config.max_devices {
            return Err(AtError::ResourceExhausted("devices"));
        }

        io.add_monitoring().map_err(|e| {
            error!("Error during adding the device monitoring: {}", e);
            AtError::Io(e)
        })?;

        let device = DeviceRef(
            self.devices
                .insert(DeviceSession::new(io, owner, &self.config)),
        );
        metrics::gauge!(metric_defs::OPEN_DEVICES.name).set(self.devices.len() as f64);
        info!("Opened {} for {}", device, owner);
        Ok(device)
    }

    /// Stop serving a device and release it.
    ///
    /// A command in flight on the device is released without notifying its
    /// handler, and queued unsolicited text is dropped. The session is released
    /// even when the device fails to close; that error is returned.
    pub fn close(&mut self, device: DeviceRef) -> AtResult<()> {
        let mut session = self.devices.remove(device.0).ok_or(AtError::InvalidHandle)?;

        for command in self.registry.bound_to(device) {
            self.registry.release(command);
        }

        metrics::gauge!(metric_defs::OPEN_DEVICES.name).set(self.devices.len() as f64);

        match session.shutdown() {
            Ok(()) => {
                info!("Closed {}", device);
                Ok(())
            }
            Err(e) => {
                error!("Failed to close {}: {}", device, e);
                Err(AtError::Io(e))
            }
        }
    }

    /// Stop interpreting input from the device, leaving it to another consumer.
    pub fn suspend(&mut self, device: DeviceRef) -> AtResult<()> {
        let session = self.session_mut(device)?;
        if !session.monitored {
            error!("{} is not monitored", device);
            return Err(AtError::NotMonitored);
        }
        session.remove_monitoring()?;
        session.suspended = true;
        info!("{} suspended", device);
        Ok(())
    }

    /// Interpret input from the device again.
    ///
    /// Unsolicited text queued while suspended is delivered if no line is in progress.
    pub fn resume(&mut self, device: DeviceRef) -> AtResult<()> {
        let session = self.session_mut(device)?;
        session.add_monitoring().map_err(|e| {
            error!("Error during adding the device monitoring: {}", e);
            AtError::Io(e)
        })?;
        session.suspended = false;
        if !session.processing {
            session.flush_unsolicited();
        }
        info!("{} resumed", device);
        Ok(())
    }

    pub fn is_suspended(&self, device: DeviceRef) -> AtResult<bool> {
        Ok(self.session(device)?.is_suspended())
    }

    /// Whether the device has a line in progress.
    pub fn is_processing(&self, device: DeviceRef) -> AtResult<bool> {
        Ok(self.session(device)?.is_processing())
    }

    pub fn device_owner(&self, device: DeviceRef) -> AtResult<ClientId> {
        Ok(self.session(device)?.owner())
    }

    /// Handles of all open devices.
    pub fn devices(&self) -> Vec<DeviceRef> {
        self.devices.keys().into_iter().map(DeviceRef).collect()
    }

    /// Tear down everything `client` owns: its commands, then its devices.
    ///
    /// A command of the client that is in flight aborts its line with ERROR.
    /// Every device is closed even if some fail; the first error is returned.
    pub fn close_client(&mut self, client: ClientId) -> AtResult<()> {
        info!("Closing everything owned by {}", client);

        for command in self.registry.owned_by(client) {
            let bound = self
                .registry
                .get(command)
                .ok()
                .filter(|entry| entry.processing)
                .and_then(|entry| entry.device);
            if let Some(device) = bound {
                self.abort_line(device);
            }
            self.registry.remove_unchecked(command)?;
        }

        let mut result = Ok(());
        let owned: Vec<DeviceRef> = self
            .devices
            .iter()
            .filter(|(_, session)| session.owner() == client)
            .map(|(key, _)| DeviceRef(key))
            .collect();
        for device in owned {
            if let Err(e) = self.close(device) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// End the device's current line with ERROR.
    fn abort_line(&mut self, device: DeviceRef) {
        for command in self.registry.bound_to(device) {
            self.registry.release(command);
        }
        if let Ok(session) = self.session_mut(device) {
            if session.processing {
                session.final_rsp = FinalResponse {
                    result: FinalResult::Error,
                    custom: None,
                };
                session.write_final();
            }
        }
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Read everything the device has and process complete lines.
    ///
    /// Does nothing while the device is suspended.
    pub fn on_readable(&mut self, device: DeviceRef) -> AtResult<()> {
        let mut buf = vec![0u8; self.config.read_chunk_size];

        loop {
            let session = self.session_mut(device)?;
            if !session.monitored {
                debug!("{} not monitored, ignoring input", device);
                return Ok(());
            }

            let n = match session.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                Err(e) => {
                    error!("Read from {} failed: {}", device, e);
                    return Err(AtError::Io(e));
                }
            };
            if n == 0 {
                return Ok(());
            }

            for event in session.framer.push(&buf[..n]) {
                self.handle_frame(device, event)?;
            }

            if n < buf.len() {
                return Ok(());
            }
        }
    }

    fn handle_frame(&mut self, device: DeviceRef, event: FrameEvent) -> AtResult<()> {
        let session = self.session_mut(device)?;
        match event {
            FrameEvent::Overflow => {
                warn!("{}: line too long, discarded", device);
                metrics::counter!(metric_defs::LINES_REJECTED.name).increment(1);
                session.write_error();
            }
            FrameEvent::Line(line) => {
                metrics::counter!(metric_defs::LINES_RECEIVED.name).increment(1);
                if session.processing {
                    warn!("{}: command in progress, line refused", device);
                    metrics::counter!(metric_defs::LINES_REJECTED.name).increment(1);
                    session.write_error();
                    return Ok(());
                }

                debug!("{}: command found {}", device, String::from_utf8_lossy(&line));
                session.processing = true;
                session.final_rsp = FinalResponse::default();
                session.parser.load(line);
                self.advance_line(device);
            }
        }
        Ok(())
    }

    /// Resolve the next sub-command of the device's line, or finish the line.
    pub(crate) fn advance_line(&mut self, device: DeviceRef) {
        let Some(session) = self.devices.get_mut(device.0) else {
            return;
        };

        session.formatter.begin_cycle();

        match session.parser.step(&mut self.registry, device) {
            ParseOutcome::Dispatch(command) => {
                if let Ok(entry) = self.registry.get(command) {
                    self.pending.push(PendingDispatch {
                        command,
                        device,
                        invocation: entry.invocation,
                    });
                }
            }
            ParseOutcome::Complete => session.write_final(),
            ParseOutcome::Failed(e) => {
                debug!("{}: error in parsing AT command: {}", device, e);
                metrics::counter!(metric_defs::PARSE_FAILURES.name).increment(1);
                session.final_rsp = FinalResponse {
                    result: FinalResult::Error,
                    custom: None,
                };
                session.write_final();
            }
        }
    }
}
