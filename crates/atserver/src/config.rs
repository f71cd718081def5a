//! Server configuration.

use atserver_protocol::{
    MAX_COMMAND_NAME_LENGTH, MAX_LINE_LENGTH, MAX_PARAMETER_LENGTH, MAX_RESPONSE_LENGTH,
    MIN_BASIC_CANDIDATE_LENGTH,
};
use serde::{Deserialize, Serialize};

use crate::error::{AtError, AtResult};

/// Capacity bounds of an [`AtServer`](crate::AtServer).
///
/// Every field has a default, so a partial YAML section is enough:
///
/// ```yaml
/// max_line_length: 256
/// max_devices: 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Longest buffered command line, `AT` prefix included.
    pub max_line_length: usize,
    /// Longest registered command name.
    pub max_command_name_length: usize,
    /// Longest single parameter.
    pub max_parameter_length: usize,
    /// Most parameters per invocation.
    pub max_parameters: usize,
    /// Longest response text; longer texts are truncated.
    pub max_response_length: usize,
    /// Most queued unsolicited responses per device.
    pub max_unsolicited_queue: usize,
    /// Most open devices.
    pub max_devices: usize,
    /// Most registered commands.
    pub max_commands: usize,
    /// Bytes requested from the device per read.
    pub read_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_line_length: MAX_LINE_LENGTH,
            max_command_name_length: MAX_COMMAND_NAME_LENGTH,
            max_parameter_length: MAX_PARAMETER_LENGTH,
            max_parameters: 32,
            max_response_length: MAX_RESPONSE_LENGTH,
            max_unsolicited_queue: 32,
            max_devices: 16,
            max_commands: 100,
            read_chunk_size: 256,
        }
    }
}

impl ServerConfig {
    /// Check that every bound is usable.
    pub fn validate(&self) -> AtResult<()> {
        let nonzero = [
            ("max_line_length", self.max_line_length),
            ("max_parameter_length", self.max_parameter_length),
            ("max_parameters", self.max_parameters),
            ("max_response_length", self.max_response_length),
            ("max_unsolicited_queue", self.max_unsolicited_queue),
            ("max_devices", self.max_devices),
            ("max_commands", self.max_commands),
            ("read_chunk_size", self.read_chunk_size),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(AtError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        if self.max_command_name_length < MIN_BASIC_CANDIDATE_LENGTH {
            return Err(AtError::InvalidConfig(format!(
                "max_command_name_length must be at least {}",
                MIN_BASIC_CANDIDATE_LENGTH
            )));
        }

        if self.max_command_name_length > self.max_line_length {
            return Err(AtError::InvalidConfig(format!(
                "max_command_name_length ({}) exceeds max_line_length ({})",
                self.max_command_name_length, self.max_line_length
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_line_length, 512);
        assert_eq!(config.max_commands, 100);
    }

    #[test]
    fn test_zero_bound_rejected() {
        let config = ServerConfig {
            max_devices: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AtError::InvalidConfig(_))));
    }

    #[test]
    fn test_name_longer_than_line_rejected() {
        let config = ServerConfig {
            max_line_length: 16,
            max_command_name_length: 32,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AtError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_yaml() {
        let config: ServerConfig =
            serde_yaml::from_str("max_line_length: 256\nmax_devices: 4\n").unwrap();
        assert_eq!(config.max_line_length, 256);
        assert_eq!(config.max_devices, 4);
        assert_eq!(config.max_parameters, 32);
        assert!(config.validate().is_ok());
    }
}
