//! Handle and identity types shared across the server.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slots::SlotKey;

/// Handle to a registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandRef(pub(crate) SlotKey);

/// Handle to an open device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef(pub(crate) SlotKey);

impl fmt::Display for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}.{}", self.0.index(), self.0.generation())
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}.{}", self.0.index(), self.0.generation())
    }
}

/// Identity of the client that created a command or opened a device.
///
/// When a client goes away, everything it owns is torn down together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Devices on which a command may be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvailableDevice {
    /// Any open device.
    #[default]
    AllDevices,
    /// Only this device.
    Specific(DeviceRef),
}

impl AvailableDevice {
    /// Whether a command with this availability may run on `device`.
    pub fn allows(&self, device: DeviceRef) -> bool {
        match self {
            AvailableDevice::AllDevices => true,
            AvailableDevice::Specific(only) => *only == device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::SlotTable;

    #[test]
    fn test_available_device() {
        let mut table = SlotTable::new();
        let a = DeviceRef(table.insert(()));
        let b = DeviceRef(table.insert(()));

        assert!(AvailableDevice::AllDevices.allows(a));
        assert!(AvailableDevice::Specific(a).allows(a));
        assert!(!AvailableDevice::Specific(a).allows(b));
    }

    #[test]
    fn test_display() {
        assert_eq!(ClientId(7).to_string(), "client-7");
    }
}
