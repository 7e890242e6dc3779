//! Port enumeration and opening.
//!
//! The link worker never talks to `serialport` directly: it goes through a
//! [`PortProvider`] so the whole connection manager can run against an
//! in-memory port in tests.

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::warn;

use crate::error::{LinkError, LinkResult};

/// A byte stream the link can read from and write to.
///
/// Reads must return within the configured timeout; a read that times out
/// reports [`io::ErrorKind::TimedOut`] or [`io::ErrorKind::WouldBlock`].
pub trait SerialIo: Read + Write + Send {}

impl<T: Read + Write + Send> SerialIo for T {}

/// Settings used to open a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    /// Baud rate, 8N1.
    pub baud_rate: u32,
    /// Maximum time one read may block.
    pub read_timeout: Duration,
}

/// Source of serial ports.
pub trait PortProvider: Send + Sync + 'static {
    /// Names of every serial port currently present, in enumeration order.
    fn available_ports(&self) -> Vec<String>;

    /// Open `path` for exclusive use by the link.
    fn open(&self, path: &str, settings: &PortSettings) -> LinkResult<Box<dyn SerialIo>>;
}

/// Ports provided by the operating system through `serialport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortProvider for SystemPorts {
    fn available_ports(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("SystemPorts: enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    fn open(&self, path: &str, settings: &PortSettings) -> LinkResult<Box<dyn SerialIo>> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|source| LinkError::Serial {
                port: path.to_string(),
                source,
            })?;
        Ok(Box::new(port))
    }
}

/// Whether a read error only means "no data yet".
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_transient(&io::Error::new(
            io::ErrorKind::Other,
            "device not configured"
        )));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let settings = PortSettings {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(20),
        };
        let err = SystemPorts
            .open("/dev/neewer-does-not-exist", &settings)
            .err()
            .unwrap();
        assert!(matches!(err, LinkError::Serial { ref port, .. } if port == "/dev/neewer-does-not-exist"));
    }
}
