//! Color temperature calibration.
//!
//! The panel takes a device-specific byte for each of its 19 color
//! temperature steps. The mapping is not a formula: only 7000K -> `0x09` has
//! been confirmed on hardware, so the rest must come from calibration data
//! supplied by the caller (see `neewer-serial`'s configuration file).

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};

/// One Kelvin -> device byte pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    /// Logical color temperature (one of [`SUPPORTED_KELVIN`]).
    pub kelvin: u32,
    /// Byte the device expects in the CCT payload.
    pub byte: u8,
}

/// Ordered Kelvin <-> device byte lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTable {
    /// Sorted by Kelvin, no duplicate Kelvin or byte.
    entries: Vec<CalibrationEntry>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::confirmed()
    }
}

impl CalibrationTable {
    /// Build a table from externally supplied entries.
    ///
    /// Every Kelvin must be a supported step, and neither a Kelvin value nor a
    /// device byte may appear twice.
    pub fn new(entries: impl IntoIterator<Item = CalibrationEntry>) -> ProtocolResult<Self> {
        let mut entries: Vec<CalibrationEntry> = entries.into_iter().collect();

        for entry in &entries {
            ensure_supported(entry.kelvin)?;
        }

        entries.sort_by_key(|e| e.kelvin);

        for pair in entries.windows(2) {
            if pair[0].kelvin == pair[1].kelvin {
                return Err(ProtocolError::DuplicateCalibrationKelvin(pair[0].kelvin));
            }
        }

        for (i, a) in entries.iter().enumerate() {
            if let Some(b) = entries[i + 1..].iter().find(|b| b.byte == a.byte) {
                return Err(ProtocolError::DuplicateCalibrationByte {
                    byte: a.byte,
                    first: a.kelvin,
                    second: b.kelvin,
                });
            }
        }

        Ok(CalibrationTable { entries })
    }

    /// The hardware-confirmed table: 7000K only.
    pub fn confirmed() -> Self {
        CalibrationTable {
            entries: vec![CalibrationEntry {
                kelvin: CONFIRMED_KELVIN,
                byte: CONFIRMED_KELVIN_BYTE,
            }],
        }
    }

    /// Device byte for a color temperature.
    ///
    /// Fails with [`ProtocolError::UnsupportedKelvin`] if `kelvin` is not a
    /// panel step, or [`ProtocolError::CalibrationGap`] if it is a step with
    /// no entry.
    pub fn byte_for(&self, kelvin: u32) -> ProtocolResult<u8> {
        ensure_supported(kelvin)?;
        self.entries
            .binary_search_by_key(&kelvin, |e| e.kelvin)
            .map(|i| self.entries[i].byte)
            .map_err(|_| ProtocolError::CalibrationGap(kelvin))
    }

    /// Color temperature for a device byte, if calibrated.
    pub fn kelvin_for(&self, byte: u8) -> Option<u32> {
        self.entries.iter().find(|e| e.byte == byte).map(|e| e.kelvin)
    }

    /// Whether `kelvin` has an entry.
    pub fn contains(&self, kelvin: u32) -> bool {
        self.byte_for(kelvin).is_ok()
    }

    /// Entries, warmest first.
    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    /// Number of calibrated steps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Supported steps that have no entry yet.
    pub fn missing(&self) -> Vec<u32> {
        SUPPORTED_KELVIN
            .iter()
            .copied()
            .filter(|k| !self.contains(*k))
            .collect()
    }
}

/// Whether `kelvin` is exactly one of the panel's steps.
pub fn is_supported_kelvin(kelvin: u32) -> bool {
    SUPPORTED_KELVIN.contains(&kelvin)
}

/// Clamp `kelvin` into range and snap it to the closest step.
///
/// Ties go to the warmer step.
pub fn nearest_supported_kelvin(kelvin: u32) -> u32 {
    let k = kelvin.clamp(KELVIN_MIN, KELVIN_MAX);
    SUPPORTED_KELVIN
        .iter()
        .copied()
        .min_by_key(|step| step.abs_diff(k))
        .unwrap_or(KELVIN_MAX)
}

fn ensure_supported(kelvin: u32) -> ProtocolResult<()> {
    if is_supported_kelvin(kelvin) {
        Ok(())
    } else {
        Err(ProtocolError::UnsupportedKelvin {
            kelvin,
            nearest: nearest_supported_kelvin(kelvin),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kelvin: u32, byte: u8) -> CalibrationEntry {
        CalibrationEntry { kelvin, byte }
    }

    #[test]
    fn test_supported_steps() {
        assert_eq!(SUPPORTED_KELVIN.len(), 19);
        assert_eq!(SUPPORTED_KELVIN[0], KELVIN_MIN);
        assert_eq!(SUPPORTED_KELVIN[18], KELVIN_MAX);
        assert!(SUPPORTED_KELVIN.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_confirmed_table() {
        let table = CalibrationTable::confirmed();
        assert_eq!(table.byte_for(7000), Ok(0x09));
        assert_eq!(table.kelvin_for(0x09), Some(7000));
        assert_eq!(table.len(), 1);
        assert_eq!(table.missing().len(), 18);
    }

    #[test]
    fn test_calibration_gap_is_rejected() {
        let table = CalibrationTable::confirmed();
        assert_eq!(table.byte_for(4950), Err(ProtocolError::CalibrationGap(4950)));
    }

    #[test]
    fn test_unsupported_kelvin_is_rejected() {
        let table = CalibrationTable::confirmed();
        assert_eq!(
            table.byte_for(5000),
            Err(ProtocolError::UnsupportedKelvin {
                kelvin: 5000,
                nearest: 4950
            })
        );
    }

    #[test]
    fn test_new_sorts_entries() {
        let table =
            CalibrationTable::new([entry(7000, 0x09), entry(2900, 0x00), entry(4950, 0x05)])
                .unwrap();
        let kelvins: Vec<u32> = table.entries().iter().map(|e| e.kelvin).collect();
        assert_eq!(kelvins, vec![2900, 4950, 7000]);
        assert_eq!(table.byte_for(4950), Ok(0x05));
        assert_eq!(table.kelvin_for(0x00), Some(2900));
        assert_eq!(table.kelvin_for(0x42), None);
    }

    #[test]
    fn test_new_rejects_duplicates() {
        assert_eq!(
            CalibrationTable::new([entry(7000, 0x09), entry(7000, 0x0A)]),
            Err(ProtocolError::DuplicateCalibrationKelvin(7000))
        );
        assert_eq!(
            CalibrationTable::new([entry(2900, 0x09), entry(7000, 0x09)]),
            Err(ProtocolError::DuplicateCalibrationByte {
                byte: 0x09,
                first: 2900,
                second: 7000
            })
        );
    }

    #[test]
    fn test_new_rejects_unsupported_step() {
        assert!(matches!(
            CalibrationTable::new([entry(6500, 0x08)]),
            Err(ProtocolError::UnsupportedKelvin { kelvin: 6500, .. })
        ));
    }

    #[test]
    fn test_nearest_supported_kelvin() {
        assert_eq!(nearest_supported_kelvin(0), 2900);
        assert_eq!(nearest_supported_kelvin(10_000), 7000);
        assert_eq!(nearest_supported_kelvin(5000), 4950);
        assert_eq!(nearest_supported_kelvin(5600), 5633);
        assert_eq!(nearest_supported_kelvin(6089), 6089);
    }
}
