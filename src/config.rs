//! TOML configuration for the vMix client
//!
//! ```toml
//! [connection]
//! host = "192.168.1.50"
//! port = 8099
//! auto_reconnect = true
//! connect_timeout_ms = 5000
//! reconnect_interval_ms = 10000
//!
//! [logging]
//! level = "INFO"
//! format = "compact"
//! ```

use crate::observability::logging::LogFormat;
use crate::transport::tcp::state::{
    ConnectionOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub connection: ConnectionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Connection section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Host name or address of the vMix machine
    pub host: String,
    /// Environment variable that overrides `host` when set
    pub host_env: Option<String>,
    #[serde(default = "default_port")]
    pub port: u32,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_true")]
    pub connect_on_startup: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub debug_buffers: bool,
}

impl ConnectionSection {
    /// Section for `host` with every other field at its default
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            host_env: None,
            port: default_port(),
            auto_reconnect: default_true(),
            connect_on_startup: default_true(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            debug: false,
            debug_buffers: false,
        }
    }
}

fn default_port() -> u32 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL.as_millis() as u64
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// ERROR, WARN, INFO, DEBUG or TRACE
    #[serde(default = "default_log_level")]
    pub level: String,
    /// json, pretty or compact
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl LoggingSection {
    pub fn level(&self) -> Level {
        parse_level(&self.level)
    }

    pub fn format(&self) -> LogFormat {
        LogFormat::parse(&self.format)
    }
}

/// Parse a level name, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check host, port and timer settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_options()
            .validate(&self.host())
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    /// Effective host, honouring `host_env` when the variable is set
    pub fn host(&self) -> String {
        self.connection
            .host_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.connection.host.clone())
    }

    /// Client options described by the `[connection]` section
    pub fn to_options(&self) -> ConnectionOptions {
        let connection = &self.connection;
        ConnectionOptions::default()
            .with_port(connection.port)
            .with_auto_reconnect(connection.auto_reconnect)
            .with_connect_on_startup(connection.connect_on_startup)
            .with_debug(connection.debug, connection.debug_buffers)
            .with_timing(
                Duration::from_millis(connection.connect_timeout_ms),
                Duration::from_millis(connection.reconnect_interval_ms),
            )
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
