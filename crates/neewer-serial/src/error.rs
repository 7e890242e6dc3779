//! Error types for the serial link.

use neewer_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by [`LightLink`](crate::LightLink) requests.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The request needs an open port.
    #[error("not connected to a panel")]
    NotConnected,

    /// Reading from or writing to the open port failed. The connection has
    /// been dropped.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port could not be opened.
    #[error("failed to open {port}: {source}")]
    Serial {
        /// Port path that failed.
        port: String,
        /// Underlying driver error.
        #[source]
        source: serialport::Error,
    },

    /// Auto-discovery found no candidate port that would open.
    #[error("no matching serial port found")]
    NoPortFound,

    /// The request could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The configuration was rejected when starting the link.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The link worker is gone.
    #[error("link worker has shut down")]
    Shutdown,
}

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors that can occur while loading a [`LinkConfig`](crate::LinkConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for this configuration.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The calibration list is not a valid table.
    #[error("invalid calibration: {0}")]
    Protocol(#[from] ProtocolError),

    /// A field holds a value the link cannot run with.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}
