//! Device status decoding and echo suppression.
//!
//! The panel sends a CCT frame whenever its state changes: both when it
//! parrots a command we just wrote and when someone turns a knob on the
//! device. The [`StatusDecoder`] keeps the last write as a [`PendingEcho`]
//! so the first kind can be dropped and only the second reported.

use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;

use crate::calibration::CalibrationTable;
use crate::constants::*;
use crate::frame::Frame;

/// How long after a write an identical inbound frame counts as its echo.
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_millis(600);

/// Brightness restored by a power-on before any brightness was observed.
pub const DEFAULT_ON_BRIGHTNESS: u8 = MAX_BRIGHTNESS;

/// A status change reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightStatus {
    /// Brightness percent, 0..=100.
    pub brightness: u8,
    /// Color temperature, `None` if the device byte is not calibrated.
    pub kelvin: Option<u32>,
}

/// Best known state of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightState {
    /// Brightness percent, 0 means off.
    pub brightness: u8,
    /// Color temperature, `None` until known.
    pub kelvin: Option<u32>,
    /// Last non-zero brightness, restored on power-on.
    last_on_brightness: u8,
}

impl Default for LightState {
    fn default() -> Self {
        LightState {
            brightness: 0,
            kelvin: None,
            last_on_brightness: DEFAULT_ON_BRIGHTNESS,
        }
    }
}

impl LightState {
    /// Whether the panel is lit.
    pub fn powered(&self) -> bool {
        self.brightness > 0
    }

    /// Brightness to restore when turning the panel back on.
    pub fn last_on_brightness(&self) -> u8 {
        self.last_on_brightness
    }

    /// Apply a brightness/temperature update. An unknown temperature keeps
    /// the previous one.
    pub fn apply(&mut self, brightness: u8, kelvin: Option<u32>) {
        self.brightness = brightness;
        if brightness > 0 {
            self.last_on_brightness = brightness;
        }
        if kelvin.is_some() {
            self.kelvin = kelvin;
        }
    }
}

/// The last frame we wrote, waiting for the device to echo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEcho {
    /// When the frame was written.
    pub sent_at: Instant,
    /// The frame that was written.
    pub frame: Frame,
}

impl PendingEcho {
    /// Whether the suppression window has passed at `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) > window
    }

    /// Whether `frame` repeats the pending write.
    pub fn matches(&self, frame: &Frame) -> bool {
        self.frame.tag() == frame.tag() && self.frame.payload() == frame.payload()
    }
}

/// Result of feeding one frame to the [`StatusDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Device-originated change; report it.
    Changed(LightStatus),
    /// The device repeated our own write.
    EchoSuppressed,
    /// Unknown tag or malformed payload.
    Ignored,
}

/// Brightness and temperature byte from a well-formed CCT frame.
pub fn parse_cct(frame: &Frame) -> Option<(u8, u8)> {
    match frame.payload() {
        [CCT_MODE, brightness, temp]
            if frame.tag() == TAG_CCT && *brightness <= MAX_BRIGHTNESS =>
        {
            Some((*brightness, *temp))
        }
        _ => None,
    }
}

/// Turns inbound frames into device state changes.
#[derive(Debug, Clone)]
pub struct StatusDecoder {
    /// Resolves temperature bytes back to Kelvin.
    table: CalibrationTable,
    /// Echo suppression window.
    echo_window: Duration,
    /// Last write not yet echoed.
    pending: Option<PendingEcho>,
    /// Best known state.
    state: LightState,
}

impl StatusDecoder {
    /// Create a decoder with the default echo window.
    pub fn new(table: CalibrationTable) -> Self {
        Self::with_echo_window(table, DEFAULT_ECHO_WINDOW)
    }

    /// Create a decoder with a custom echo window.
    pub fn with_echo_window(table: CalibrationTable, echo_window: Duration) -> Self {
        StatusDecoder {
            table,
            echo_window,
            pending: None,
            state: LightState::default(),
        }
    }

    /// The calibration table in use.
    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Best known state.
    pub fn state(&self) -> LightState {
        self.state
    }

    /// The write currently awaiting its echo, if any.
    pub fn pending_echo(&self) -> Option<&PendingEcho> {
        self.pending.as_ref()
    }

    /// Record a frame we just wrote.
    ///
    /// Replaces any previous pending echo and applies CCT frames to the local
    /// state before the device confirms them.
    pub fn record_write(&mut self, frame: &Frame, now: Instant) {
        if let Some((brightness, temp)) = parse_cct(frame) {
            self.state.apply(brightness, self.table.kelvin_for(temp));
        }
        self.pending = Some(PendingEcho {
            sent_at: now,
            frame: frame.clone(),
        });
    }

    /// Drop the pending echo once its window has passed.
    pub fn expire(&mut self, now: Instant) {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.is_expired(now, self.echo_window))
        {
            self.pending = None;
        }
    }

    /// Drop the pending echo, e.g. after the connection was lost.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Interpret one inbound frame.
    pub fn handle_frame(&mut self, frame: &Frame, now: Instant) -> StatusOutcome {
        let Some((brightness, temp)) = parse_cct(frame) else {
            debug!(
                "ignoring frame tag=0x{:02X} len={}",
                frame.tag(),
                frame.payload().len()
            );
            return StatusOutcome::Ignored;
        };

        self.expire(now);
        if self.pending.as_ref().is_some_and(|p| p.matches(frame)) {
            self.pending = None;
            return StatusOutcome::EchoSuppressed;
        }

        let kelvin = self.table.kelvin_for(temp);
        if kelvin.is_none() {
            debug!("temperature byte 0x{:02X} has no calibration entry", temp);
        }
        self.state.apply(brightness, kelvin);
        StatusOutcome::Changed(LightStatus { brightness, kelvin })
    }
}
