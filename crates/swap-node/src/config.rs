//! TOML-based configuration for SWAP nodes.
//!
//! The `[device]` section supplies factory defaults: once a node has
//! persisted its settings, the stored values win on subsequent boots
//! (matching how the original firmware treated configuration memory).

use std::path::Path;

use serde::Deserialize;

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub radio: RadioSection,
    #[serde(default)]
    pub repeater: RepeaterSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[device]` section: factory defaults for the persisted settings.
#[derive(Debug, Deserialize)]
pub struct DeviceSection {
    /// Device address on the network. 0 is reserved for broadcast and
    /// rejected at startup.
    #[serde(default = "default_address")]
    pub address: u8,
    /// Frequency channel.
    #[serde(default)]
    pub channel: u8,
    /// Network id (radio sync word).
    #[serde(default = "default_network_id")]
    pub network_id: u16,
    /// Security nibble: bit0 anti-replay, bit1 encryption required.
    #[serde(default)]
    pub security: u8,
    /// Stream auto-flush interval, milliseconds. 0 selects the `[stream]`
    /// section default.
    #[serde(default)]
    pub tx_interval: u16,
    /// Custom settings file path. Defaults to `~/.swap/settings`.
    pub storage_path: Option<String>,
    /// Whether to persist settings at all. Default: true.
    #[serde(default = "default_enable_storage")]
    pub enable_storage: bool,
}

fn default_address() -> u8 {
    1
}

fn default_network_id() -> u16 {
    0xB547
}

fn default_enable_storage() -> bool {
    true
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            channel: 0,
            network_id: default_network_id(),
            security: 0,
            tx_interval: 0,
            storage_path: None,
            enable_storage: default_enable_storage(),
        }
    }
}

/// The `[radio]` section: UDP shared-channel simulation parameters.
#[derive(Debug, Deserialize)]
pub struct RadioSection {
    /// UDP port standing in for the shared RF channel.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Broadcast target. Defaults to the local broadcast address.
    #[serde(default = "default_broadcast_addr")]
    pub broadcast: String,
}

fn default_port() -> u16 {
    4270
}

fn default_broadcast_addr() -> String {
    "255.255.255.255".to_string()
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            broadcast: default_broadcast_addr(),
        }
    }
}

/// The `[repeater]` section.
#[derive(Debug, Deserialize)]
pub struct RepeaterSection {
    #[serde(default)]
    pub enabled: bool,
    /// Maximum hop count a packet may reach before it stops being
    /// forwarded. Capped at 15 by the wire nibble.
    #[serde(default = "default_max_hop")]
    pub max_hop: u8,
}

fn default_max_hop() -> u8 {
    5
}

impl Default for RepeaterSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_hop: default_max_hop(),
        }
    }
}

/// The `[stream]` section.
#[derive(Debug, Deserialize)]
pub struct StreamSection {
    /// Auto-flush interval for buffered stream bytes, milliseconds.
    #[serde(default = "default_autoflush_ms")]
    pub autoflush_ms: u64,
}

fn default_autoflush_ms() -> u64 {
    100
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            autoflush_ms: default_autoflush_ms(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
