use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::ConfigError;
use super::forward::ForwardConfig;
use super::logging::LoggingConfig;
use super::server::ServerConfig;

/// Main configuration structure for dns-forward
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listener configuration (port, bind address)
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upstream forwarding configuration
    #[serde(default)]
    pub forward: ForwardSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardSection {
    /// `forward FROM TO... { ... }` directive text
    #[serde(default = "default_directive")]
    pub directive: String,

    /// Per-attempt upstream timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            directive: default_directive(),
            timeout_ms: None,
        }
    }
}

fn default_directive() -> String {
    "forward . 8.8.8.8:53 1.1.1.1:53".to_string()
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. dns-forward.toml in current directory
    /// 3. /etc/dns-forward/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("dns-forward.toml").exists() {
            Self::from_file("dns-forward.toml")?
        } else if std::path::Path::new("/etc/dns-forward/config.toml").exists() {
            Self::from_file("/etc/dns-forward/config.toml")?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Parses the forward directive and applies file-level overrides.
    pub fn forward_config(&self) -> Result<ForwardConfig, ConfigError> {
        let mut forward = ForwardConfig::from_directive(&self.forward.directive)?;
        if let Some(timeout_ms) = self.forward.timeout_ms {
            if timeout_ms == 0 {
                return Err(ConfigError::Validation(
                    "forward.timeout_ms cannot be 0".to_string(),
                ));
            }
            forward.timeout = Duration::from_millis(timeout_ms);
        }
        Ok(forward)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }
        self.forward_config().map(|_| ())
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}
