//! Connection state and events published by the link.

use std::fmt;

use serde::Serialize;

/// Connection state as seen by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No port is open.
    #[default]
    Disconnected,
    /// A port is being opened.
    Connecting,
    /// A port is open and being read.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Events emitted by the link worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkEvent {
    /// Someone changed the panel using its physical controls.
    LightStatus {
        /// Brightness percent, 0 means off.
        brightness: u8,
        /// Color temperature, `None` if the device byte is not calibrated.
        kelvin: Option<u32>,
    },

    /// A port was opened, explicitly or by auto-discovery.
    Connected {
        /// Port path.
        port: String,
    },

    /// The open port failed or went away.
    Disconnected {
        /// Port path.
        port: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }

    #[test]
    fn test_event_serialization() {
        let event = LinkEvent::LightStatus {
            brightness: 40,
            kelvin: Some(7000),
        };
        let yaml = serde_yaml::to_string(&event).unwrap();
        assert!(yaml.contains("type: light_status"));
        assert!(yaml.contains("brightness: 40"));

        let event = LinkEvent::Disconnected {
            port: "/dev/ttyUSB0".into(),
        };
        let yaml = serde_yaml::to_string(&event).unwrap();
        assert!(yaml.contains("type: disconnected"));
    }
}
