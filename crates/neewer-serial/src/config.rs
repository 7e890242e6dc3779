//! Link configuration.
//!
//! Loaded from YAML; every field is optional. Example:
//!
//! ```yaml
//! baud_rate: 115200
//! debounce_ms: 30
//! port_patterns: [usbserial, ttyUSB]
//! calibration:
//!   - { kelvin: 2900, byte: 0x00 }
//!   - { kelvin: 7000, byte: 0x09 }
//! ```

use std::path::Path;
use std::time::Duration;

use neewer_protocol::{
    CalibrationEntry, CalibrationTable, ProtocolResult, DEFAULT_BAUD_RATE, DEFAULT_ECHO_WINDOW,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Connection manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Serial baud rate (8N1 is fixed).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound on one blocking read, and the worker's tick.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Delay between auto-discovery attempts while disconnected, and between
    /// unplug checks while connected.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Window over which `set_light` intents are coalesced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long an identical inbound frame counts as the echo of a write.
    #[serde(default = "default_echo_window_ms")]
    pub echo_window_ms: u64,

    /// Discover and open a port without an explicit `connect`.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Substrings a port name must contain to be listed.
    #[serde(default = "default_port_patterns")]
    pub port_patterns: Vec<String>,

    /// Kelvin -> device byte pairs. Empty means the confirmed built-in table.
    #[serde(default)]
    pub calibration: Vec<CalibrationEntry>,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_read_timeout_ms() -> u64 {
    20
}
fn default_reconnect_interval_ms() -> u64 {
    2000
}
fn default_debounce_ms() -> u64 {
    30
}
fn default_echo_window_ms() -> u64 {
    DEFAULT_ECHO_WINDOW.as_millis() as u64
}
fn default_true() -> bool {
    true
}
fn default_port_patterns() -> Vec<String> {
    ["usbserial", "ttyUSB", "wchusbserial"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            debounce_ms: default_debounce_ms(),
            echo_window_ms: default_echo_window_ms(),
            auto_connect: default_true(),
            port_patterns: default_port_patterns(),
            calibration: Vec::new(),
        }
    }
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: LinkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the values the link cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "baud_rate",
                reason: "must be non-zero",
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "read_timeout_ms",
                reason: "must be non-zero",
            });
        }
        self.calibration_table()?;
        Ok(())
    }

    /// The calibration table described by this configuration.
    pub fn calibration_table(&self) -> ProtocolResult<CalibrationTable> {
        if self.calibration.is_empty() {
            Ok(CalibrationTable::confirmed())
        } else {
            CalibrationTable::new(self.calibration.iter().copied())
        }
    }

    /// Whether `port` matches one of the configured patterns.
    pub fn matches_port(&self, port: &str) -> bool {
        self.port_patterns.iter().any(|p| port.contains(p.as_str()))
    }

    /// Serial read timeout, also the worker's tick.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Delay between auto-discovery attempts.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Coalescing window for [`LightLink::set_light`](crate::LightLink::set_light).
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// How long a write's echo is expected.
    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }
}
