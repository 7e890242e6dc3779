//! Connection manager for Neewer LED panels over USB serial.
//!
//! [`LightLink`] owns the serial port on a background thread: it discovers
//! and opens the panel, decodes its status frames, coalesces rapid light
//! changes, and reconnects after the cable is pulled. Device-originated
//! changes arrive on a [`LinkEvent`] channel; echoes of the link's own writes
//! are filtered out.
//!
//! # Example
//!
//! ```rust,no_run
//! use neewer_serial::{LightLink, LinkConfig, LinkEvent};
//!
//! let config = LinkConfig::from_file("neewer.yaml")?;
//! let (link, events) = LightLink::open(config)?;
//!
//! link.connect("/dev/cu.usbserial-1410")?;
//! link.set_light(80, 7000)?;
//!
//! for event in events.iter() {
//!     if let LinkEvent::LightStatus { brightness, kelvin } = event {
//!         println!("knob: {}% {:?}K", brightness, kelvin);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

mod config;
mod debounce;
mod error;
mod events;
mod link;
mod transport;

pub use config::LinkConfig;
pub use debounce::Debouncer;
pub use error::{ConfigError, LinkError, LinkResult};
pub use events::{ConnectionState, LinkEvent};
pub use link::LightLink;
pub use transport::{is_transient, PortProvider, PortSettings, SerialIo, SystemPorts};

pub use neewer_protocol as protocol;
