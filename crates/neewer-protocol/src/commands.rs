//! Commands that can be sent to the panel.

use crate::calibration::CalibrationTable;
use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;

/// Commands that can be sent to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set brightness and color temperature.
    Cct {
        /// Brightness percent, clamped to 0..=100 when encoded.
        brightness: u8,
        /// Color temperature, must be a calibrated step.
        kelvin: u32,
    },

    /// Turn the panel on or off.
    ///
    /// Sent as a CCT frame: off is brightness 0, on restores
    /// `last_brightness`.
    Power {
        /// Desired power state.
        on: bool,
        /// Brightness to restore when turning on.
        last_brightness: u8,
        /// Color temperature to keep.
        kelvin: u32,
    },

    /// The protocol's dedicated power opcode ([`TAG_POWER`]).
    ///
    /// Has no effect on this hardware class; encoding it always fails with
    /// [`ProtocolError::UnsupportedOnHardware`]. Use [`Command::Power`].
    PowerTag {
        /// Desired power state.
        on: bool,
    },
}

impl Command {
    /// Encode the command as a frame, resolving Kelvin through `table`.
    pub fn encode(&self, table: &CalibrationTable) -> ProtocolResult<Frame> {
        match *self {
            Command::Cct { brightness, kelvin } => build_cct(table, brightness, kelvin),
            Command::Power {
                on,
                last_brightness,
                kelvin,
            } => build_power(table, on, last_brightness, kelvin),
            Command::PowerTag { .. } => Err(ProtocolError::UnsupportedOnHardware {
                tag: TAG_POWER,
                reason: "power opcode is ignored by the panel, use a CCT power command",
            }),
        }
    }
}

/// Build a CCT frame: `[0x01, brightness, device_temp_byte]`.
///
/// Brightness is clamped to 0..=100. The Kelvin value must be a supported
/// step with a calibration entry.
pub fn build_cct(table: &CalibrationTable, brightness: u8, kelvin: u32) -> ProtocolResult<Frame> {
    let temp = table.byte_for(kelvin)?;
    Frame::new(TAG_CCT, &[CCT_MODE, brightness.min(MAX_BRIGHTNESS), temp])
}

/// Build a power frame for this hardware class.
///
/// The panel ignores [`TAG_POWER`], so power is a CCT frame with brightness
/// 0 (off) or `last_brightness` (on).
pub fn build_power(
    table: &CalibrationTable,
    on: bool,
    last_brightness: u8,
    kelvin: u32,
) -> ProtocolResult<Frame> {
    let brightness = if on { last_brightness } else { 0 };
    build_cct(table, brightness, kelvin)
}
