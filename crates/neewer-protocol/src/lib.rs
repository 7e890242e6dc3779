//! Neewer USB Serial Protocol
//!
//! This crate provides the pure, I/O-free half of the panel driver: the frame
//! codec, the command builder and the status decoder.
//!
//! # Protocol Overview
//!
//! The PL81-Pro class of panels speaks a small framed protocol at 115200 8N1.
//! Every frame starts with `0x3A`, carries a tag and a length-prefixed payload,
//! and ends with a big-endian 16-bit additive checksum. The only functional
//! tag on this hardware is CCT (`0x02`), which carries brightness and a
//! device-specific color temperature byte.
//!
//! - **Commands** (host → panel): built by [`Command::encode`] / [`build_cct`]
//! - **Status** (panel → host): the panel echoes every command it accepts and
//!   also reports knob changes, both as CCT frames; [`StatusDecoder`] tells
//!   them apart
//!
//! # Example
//!
//! ```rust
//! use neewer_protocol::{build_cct, CalibrationTable, FrameDecoder};
//!
//! let table = CalibrationTable::confirmed();
//! let frame = build_cct(&table, 100, 7000).unwrap();
//! assert_eq!(frame.encode(), [0x3A, 0x02, 0x03, 0x01, 0x64, 0x09, 0x00, 0xAD]);
//!
//! let mut decoder = FrameDecoder::new();
//! let frames = decoder.feed(&[0xFF, 0xFF, 0x3A, 0x02, 0x03, 0x01, 0x0A, 0x09, 0x00, 0x53]);
//! assert_eq!(frames[0].payload()[1], 10);
//! ```

mod calibration;
mod commands;
mod constants;
mod error;
mod frame;
mod status;

pub use calibration::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use status::*;
