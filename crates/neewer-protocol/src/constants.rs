//! Protocol constants
//!
//! Byte values, tags and limits used by the Neewer USB serial protocol.

// ============================================================================
// Framing
// ============================================================================

/// First byte of every frame, in both directions.
pub const FRAME_PREFIX: u8 = 0x3A;
/// Prefix + tag + payload length.
pub const HEADER_SIZE: usize = 3;
/// Big-endian 16-bit checksum.
pub const CHECKSUM_SIZE: usize = 2;
/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;
/// Largest complete frame on the wire.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + CHECKSUM_SIZE;

// ============================================================================
// Tags
// ============================================================================

/// CCT (brightness + color temperature) command and status.
pub const TAG_CCT: u8 = 0x02;
/// Dedicated power command.
///
/// Accepted by the device but has no observable effect on the PL81 class of
/// panels. Power is driven through [`TAG_CCT`] with brightness 0 instead.
pub const TAG_POWER: u8 = 0x06;

// ============================================================================
// CCT payload
// ============================================================================

/// Mode byte that opens every CCT payload.
pub const CCT_MODE: u8 = 0x01;
/// CCT payload length: mode, brightness, temperature byte.
pub const CCT_PAYLOAD_SIZE: usize = 3;
/// Highest brightness the device accepts.
pub const MAX_BRIGHTNESS: u8 = 100;

// ============================================================================
// Color temperature
// ============================================================================

/// Warmest supported color temperature.
pub const KELVIN_MIN: u32 = 2900;
/// Coolest supported color temperature.
pub const KELVIN_MAX: u32 = 7000;
/// Number of discrete color temperature steps the panel exposes.
pub const KELVIN_STEP_COUNT: usize = 19;

/// The supported color temperatures, warmest first.
///
/// Equally spaced over [`KELVIN_MIN`, `KELVIN_MAX`], rounded to whole Kelvin.
/// These are the logical values only; the byte the device expects for each
/// one comes from a [`CalibrationTable`](crate::CalibrationTable).
pub const SUPPORTED_KELVIN: [u32; KELVIN_STEP_COUNT] = [
    2900, 3128, 3356, 3583, 3811, 4039, 4267, 4494, 4722, 4950, 5178, 5406, 5633, 5861, 6089,
    6317, 6544, 6772, 7000,
];

/// The only calibration entry confirmed on hardware: 7000K.
pub const CONFIRMED_KELVIN: u32 = 7000;
/// Device byte for [`CONFIRMED_KELVIN`].
pub const CONFIRMED_KELVIN_BYTE: u8 = 0x09;

// ============================================================================
// Physical link
// ============================================================================

/// Serial baud rate used by the vendor application.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
