//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when building or interpreting protocol frames.
///
/// Framing problems on the inbound stream (bad checksum, truncated data) are
/// not errors: the decoder recovers from them by resynchronizing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit in the one-byte length field.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// Color temperature is not one of the panel's discrete steps.
    #[error("unsupported color temperature {kelvin}K (nearest supported step is {nearest}K)")]
    UnsupportedKelvin {
        /// Requested color temperature.
        kelvin: u32,
        /// Closest supported step.
        nearest: u32,
    },

    /// Color temperature is supported but has no calibration entry.
    #[error("no calibration entry for {0}K")]
    CalibrationGap(u32),

    /// The same color temperature appears twice in a calibration table.
    #[error("duplicate calibration entry for {0}K")]
    DuplicateCalibrationKelvin(u32),

    /// Two color temperatures map to the same device byte.
    #[error("device byte 0x{byte:02X} is assigned to both {first}K and {second}K")]
    DuplicateCalibrationByte {
        /// The shared device byte.
        byte: u8,
        /// First color temperature using it.
        first: u32,
        /// Second color temperature using it.
        second: u32,
    },

    /// Command exists in the protocol family but does nothing on this hardware.
    #[error("tag 0x{tag:02X} is not supported on this hardware: {reason}")]
    UnsupportedOnHardware {
        /// Frame tag of the rejected command.
        tag: u8,
        /// What to use instead.
        reason: &'static str,
    },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
