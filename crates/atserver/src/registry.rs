//! Command registry.
//!
//! Holds every registered command, indexed by its uppercase name. A command is
//! bound to at most one device at a time: binding sets `processing`, and the
//! final response (or the device closing) releases it.

use std::collections::HashMap;

use atserver_protocol::{normalize_command_name, CommandType};
use tracing::debug;

use crate::config::ServerConfig;
use crate::dispatch::HandlerSlot;
use crate::error::{AtError, AtResult};
use crate::pool::ParameterList;
use crate::slots::SlotTable;
use crate::types::{AvailableDevice, ClientId, CommandRef, DeviceRef};

/// A command definition and the state of its current invocation.
#[derive(Debug)]
pub struct RegisteredCommand {
    pub(crate) name: String,
    pub(crate) kind: CommandType,
    pub(crate) params: ParameterList,
    pub(crate) processing: bool,
    pub(crate) device: Option<DeviceRef>,
    pub(crate) invocation: u64,
    pub(crate) availability: AvailableDevice,
    pub(crate) owner: ClientId,
    pub(crate) handler: HandlerSlot,
}

impl RegisteredCommand {
    /// Uppercase name, `AT` prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the current (or last) invocation.
    pub fn kind(&self) -> CommandType {
        self.kind
    }

    /// Parameters of the current invocation.
    pub fn parameters(&self) -> &[String] {
        self.params.as_slice()
    }

    /// Whether an invocation is waiting for its final response.
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Device the current invocation came from.
    pub fn device(&self) -> Option<DeviceRef> {
        self.device
    }

    /// Number of times the command has been bound.
    pub fn invocation(&self) -> u64 {
        self.invocation
    }

    pub fn availability(&self) -> AvailableDevice {
        self.availability
    }

    pub fn owner(&self) -> ClientId {
        self.owner
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_attached()
    }

    /// Drop the invocation state.
    fn release(&mut self) {
        self.params.clear();
        self.device = None;
        self.processing = false;
    }
}

/// Registered commands and their name index.
#[derive(Debug)]
pub struct CommandRegistry {
    slots: SlotTable<RegisteredCommand>,
    index: HashMap<String, CommandRef>,
    max_commands: usize,
    max_name_length: usize,
    max_parameters: usize,
    max_parameter_length: usize,
}

impl CommandRegistry {
    /// Create an empty registry bounded by `config`.
    pub fn new(config: &ServerConfig) -> Self {
        CommandRegistry {
            slots: SlotTable::new(),
            index: HashMap::new(),
            max_commands: config.max_commands,
            max_name_length: config.max_command_name_length,
            max_parameters: config.max_parameters,
            max_parameter_length: config.max_parameter_length,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Register `name`, or return the existing handle if it is already registered.
    pub fn create(&mut self, owner: ClientId, name: &str) -> AtResult<CommandRef> {
        let key = normalize_command_name(name, self.max_name_length)?;

        if let Some(existing) = self.index.get(&key) {
            debug!("Command {} exists", key);
            return Ok(*existing);
        }

        if self.slots.len() >= self.max_commands {
            return Err(AtError::ResourceExhausted("commands"));
        }

        debug!("Create: {}", key);
        let command = CommandRef(self.slots.insert(RegisteredCommand {
            name: key.clone(),
            kind: CommandType::Action,
            params: ParameterList::new(self.max_parameters, self.max_parameter_length),
            processing: false,
            device: None,
            invocation: 0,
            availability: AvailableDevice::AllDevices,
            owner,
            handler: HandlerSlot::Empty,
        }));
        self.index.insert(key, command);
        Ok(command)
    }

    /// Unregister a command that is not processing.
    pub fn remove(&mut self, command: CommandRef) -> AtResult<RegisteredCommand> {
        let entry = self.get(command)?;
        if entry.processing {
            return Err(AtError::Busy(entry.name.clone()));
        }
        self.remove_unchecked(command)
    }

    /// Unregister a command whatever its state. The caller settles any invocation in flight.
    pub(crate) fn remove_unchecked(&mut self, command: CommandRef) -> AtResult<RegisteredCommand> {
        let mut entry = self.slots.remove(command.0).ok_or(AtError::InvalidHandle)?;
        self.index.remove(&entry.name);
        entry.release();
        debug!("Deleted {}", entry.name);
        Ok(entry)
    }

    pub fn get(&self, command: CommandRef) -> AtResult<&RegisteredCommand> {
        self.slots.get(command.0).ok_or(AtError::InvalidHandle)
    }

    pub fn get_mut(&mut self, command: CommandRef) -> AtResult<&mut RegisteredCommand> {
        self.slots.get_mut(command.0).ok_or(AtError::InvalidHandle)
    }

    /// Find a command by name, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<CommandRef> {
        self.index.get(&name.to_ascii_uppercase()).copied()
    }

    /// Whether `key`, an already uppercased name from a command line, names a
    /// command available on `device`. Busy commands still resolve.
    pub(crate) fn resolves_on(&self, key: &[u8], device: DeviceRef) -> bool {
        self.find_key(key)
            .and_then(|command| self.get(command).ok())
            .is_some_and(|entry| entry.availability.allows(device))
    }

    fn find_key(&self, key: &[u8]) -> Option<CommandRef> {
        std::str::from_utf8(key)
            .ok()
            .and_then(|name| self.index.get(name))
            .copied()
    }

    /// Bind the command named `key` to `device` for one invocation.
    ///
    /// Fails if the command is unknown, restricted to another device, or
    /// already processing.
    pub(crate) fn bind(&mut self, key: &[u8], device: DeviceRef) -> AtResult<CommandRef> {
        let not_found = || AtError::NotFound(String::from_utf8_lossy(key).into_owned());

        let command = self.find_key(key).ok_or_else(not_found)?;
        let entry = self.get_mut(command)?;

        if !entry.availability.allows(device) {
            return Err(not_found());
        }
        if entry.processing {
            return Err(AtError::Busy(entry.name.clone()));
        }

        entry.processing = true;
        entry.device = Some(device);
        entry.invocation += 1;
        entry.params.clear();
        Ok(command)
    }

    /// End the invocation of `command`, if any.
    pub(crate) fn release(&mut self, command: CommandRef) {
        if let Ok(entry) = self.get_mut(command) {
            entry.release();
        }
    }

    /// Commands created by `owner`.
    pub fn owned_by(&self, owner: ClientId) -> Vec<CommandRef> {
        self.slots
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(key, _)| CommandRef(key))
            .collect()
    }

    /// Commands currently processing on behalf of `device`.
    pub fn bound_to(&self, device: DeviceRef) -> Vec<CommandRef> {
        self.slots
            .iter()
            .filter(|(_, entry)| entry.processing && entry.device == Some(device))
            .map(|(key, _)| CommandRef(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry {
        CommandRegistry::new(&ServerConfig::default())
    }

    fn device() -> DeviceRef {
        let mut table = SlotTable::new();
        DeviceRef(table.insert(()))
    }

    #[test]
    fn test_create_is_idempotent_and_case_insensitive() {
        let mut reg = registry();
        let a = reg.create(ClientId(1), "AT+CSQ").unwrap();
        let b = reg.create(ClientId(2), "at+csq").unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(a).unwrap().name(), "AT+CSQ");
        assert_eq!(reg.get(a).unwrap().owner(), ClientId(1));
    }

    #[test]
    fn test_create_rejects_bad_names() {
        let mut reg = registry();
        assert!(matches!(reg.create(ClientId(0), ""), Err(AtError::Protocol(_))));
        assert!(matches!(reg.create(ClientId(0), "+CSQ"), Err(AtError::Protocol(_))));
    }

    #[test]
    fn test_capacity() {
        let config = ServerConfig {
            max_commands: 1,
            ..Default::default()
        };
        let mut reg = CommandRegistry::new(&config);
        reg.create(ClientId(0), "ATI").unwrap();
        assert!(matches!(
            reg.create(ClientId(0), "ATZ"),
            Err(AtError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_bind_and_release() {
        let mut reg = registry();
        let dev = device();
        let cmd = reg.create(ClientId(0), "AT+FOO").unwrap();

        assert_eq!(reg.bind(b"AT+FOO", dev).unwrap(), cmd);
        assert!(reg.get(cmd).unwrap().is_processing());
        assert_eq!(reg.get(cmd).unwrap().invocation(), 1);
        assert_eq!(reg.bound_to(dev), vec![cmd]);

        assert!(matches!(reg.bind(b"AT+FOO", dev), Err(AtError::Busy(_))));

        reg.release(cmd);
        assert!(!reg.get(cmd).unwrap().is_processing());
        assert!(reg.bound_to(dev).is_empty());
    }

    #[test]
    fn test_bind_unknown() {
        let mut reg = registry();
        assert!(matches!(reg.bind(b"AT+NOPE", device()), Err(AtError::NotFound(_))));
    }

    #[test]
    fn test_bind_respects_availability() {
        let mut reg = registry();
        let mut table = SlotTable::new();
        let here = DeviceRef(table.insert(()));
        let there = DeviceRef(table.insert(()));

        let cmd = reg.create(ClientId(0), "AT+FOO").unwrap();
        reg.get_mut(cmd).unwrap().availability = AvailableDevice::Specific(there);

        assert!(matches!(reg.bind(b"AT+FOO", here), Err(AtError::NotFound(_))));
        assert!(reg.bind(b"AT+FOO", there).is_ok());
    }

    #[test]
    fn test_remove_busy() {
        let mut reg = registry();
        let cmd = reg.create(ClientId(0), "AT+FOO").unwrap();
        reg.bind(b"AT+FOO", device()).unwrap();

        assert!(matches!(reg.remove(cmd), Err(AtError::Busy(_))));
        assert!(reg.get(cmd).is_ok());

        reg.release(cmd);
        reg.remove(cmd).unwrap();
        assert!(matches!(reg.get(cmd), Err(AtError::InvalidHandle)));
        assert!(reg.lookup("AT+FOO").is_none());
    }

    #[test]
    fn test_owned_by() {
        let mut reg = registry();
        let a = reg.create(ClientId(1), "ATA").unwrap();
        reg.create(ClientId(2), "ATB").unwrap();
        assert_eq!(reg.owned_by(ClientId(1)), vec![a]);
    }
}
