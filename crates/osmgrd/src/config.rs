//! Configuration file support for osmgrd
//!
//! Loads and validates osmgrd configuration from TOML files.
//! Default location: /etc/sonic/osmgrd.toml

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{OsmgrError, Result};
use crate::tables::IP_CMD;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/osmgrd.toml";

/// Kernel access configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Path to the iproute2 `ip` binary
    #[serde(default = "default_ip_cmd")]
    pub ip_cmd: String,

    /// Netlink receive buffer size in bytes
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,

    /// Log kernel changes instead of applying them
    #[serde(default)]
    pub dry_run: bool,
}

/// Where inbound desired-state changes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundSource {
    /// No inbound stream; desired state only changes through the library API
    None,
    /// JSON lines on standard input
    Stdin,
}

/// Where outbound applied-state changes go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundSink {
    /// Log each change
    Log,
    /// JSON lines on standard output
    Stdout,
}

/// Replication configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Outbound broadcast channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_inbound")]
    pub inbound: InboundSource,

    #[serde(default = "default_outbound")]
    pub outbound: OutboundSink,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

/// Complete osmgrd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsmgrConfig {
    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_ip_cmd() -> String {
    IP_CMD.to_string()
}

fn default_recv_buffer_size() -> usize {
    8192
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_inbound() -> InboundSource {
    InboundSource::None
}

fn default_outbound() -> OutboundSink {
    OutboundSink::Log
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

// Default implementations
impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            ip_cmd: default_ip_cmd(),
            recv_buffer_size: default_recv_buffer_size(),
            dry_run: false,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            inbound: default_inbound(),
            outbound: default_outbound(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl OsmgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config: Self = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                OsmgrError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(OsmgrError::Io(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| OsmgrError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.kernel.ip_cmd.trim().is_empty() {
            return Err(OsmgrError::Config("ip_cmd must not be empty".to_string()));
        }

        // Smaller than one RTM_NEWLINK message with its attributes
        if self.kernel.recv_buffer_size < 4096 {
            return Err(OsmgrError::Config(
                "recv_buffer_size must be >= 4096".to_string(),
            ));
        }

        if self.replication.channel_capacity == 0 {
            return Err(OsmgrError::Config(
                "channel_capacity must be > 0".to_string(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(OsmgrError::Config("log level must not be empty".to_string()));
        }

        Ok(())
    }
}
