//! Runner configuration, loaded from YAML.

use std::path::Path;

use atserver::ServerConfig;
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3333";

/// Top-level runner configuration.
///
/// ```yaml
/// listen: "0.0.0.0:3333"
/// unsolicited_interval_secs: 30
/// banner: "READY"
/// server:
///   max_devices: 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Address the TCP listener binds to.
    pub listen: String,
    /// Period of the `+TICK` unsolicited broadcast; disabled when absent or zero.
    pub unsolicited_interval_secs: Option<u64>,
    /// Unsolicited text sent to each new connection; empty for none.
    pub banner: String,
    /// Limits of the underlying server.
    pub server: ServerConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            listen: DEFAULT_LISTEN.to_string(),
            unsolicited_interval_secs: None,
            banner: "READY".to_string(),
            server: ServerConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> RunnerResult<Self> {
        let config: RunnerConfig = serde_yaml::from_str(text)?;
        config.server.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = RunnerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn test_nested_server_section() {
        let yaml = r#"
listen: "0.0.0.0:4000"
unsolicited_interval_secs: 5
banner: ""
server:
  max_devices: 2
"#;
        let config = RunnerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.listen, "0.0.0.0:4000");
        assert_eq!(config.unsolicited_interval_secs, Some(5));
        assert!(config.banner.is_empty());
        assert_eq!(config.server.max_devices, 2);
        assert_eq!(config.server.max_line_length, 512);
    }

    #[test]
    fn test_invalid_server_limits_rejected() {
        let yaml = "server:\n  max_commands: 0\n";
        assert!(matches!(
            RunnerConfig::from_yaml_str(yaml),
            Err(RunnerError::Server(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        assert!(matches!(
            RunnerConfig::from_yaml_str("listen: [1, 2"),
            Err(RunnerError::Yaml(_))
        ));
    }
}
