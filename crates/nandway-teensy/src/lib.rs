//! nandway-teensy - NANDway Teensy bridge support
//!
//! This crate speaks the NANDway firmware protocol: a Teensy++ wired to one
//! or two raw NAND chips, reachable as a USB serial device.
//!
//! # Protocol Overview
//!
//! The host opens the link with a two-byte ping and checks the firmware
//! version in the reply. It then selects the pull-up state and identifies a
//! chip, which yields the geometry used for every later page or block
//! command. Page and block commands carry a 24-bit page address and are
//! answered with a one-byte status.
//!
//! # Example
//!
//! ```no_run
//! use nandway_core::flash::NandDevice;
//! use nandway_teensy::{open_serial, SerialConfig, SessionConfig};
//!
//! let bridge = open_serial(&SerialConfig::new("/dev/ttyACM0"), SessionConfig::default())?;
//! let mut session = bridge.identify()?;
//!
//! let mut page = vec![0u8; session.geometry().page_size_with_spare() as usize];
//! session.read_page(0, &mut page)?;
//! # Ok::<(), nandway_core::Error>(())
//! ```

#![warn(missing_docs)]

pub mod device;
pub mod protocol;
pub mod transport;

// Re-exports
pub use device::{Bridge, Session, SessionConfig};
pub use protocol::{ChipSelect, DEFAULT_FIRMWARE};
#[cfg(feature = "serial")]
pub use transport::serial::{SerialConfig, SerialTransport};
pub use transport::{BufferedLink, Transport};

/// Open a bridge via serial port
#[cfg(feature = "serial")]
pub fn open_serial(
    serial: &SerialConfig,
    config: SessionConfig,
) -> nandway_core::Result<Bridge<SerialTransport>> {
    let transport = SerialTransport::open(serial)?;
    Bridge::new(transport, config)
}
