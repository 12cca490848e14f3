//! nandway-core - Core library for raw NAND flash programming
//!
//! This crate provides everything about NAND programming that does not
//! depend on how bytes reach the chip:
//!
//! - [`geometry`] - decoding the identify payload into a [`ChipGeometry`]
//! - [`chip`] - per-part geometry corrections and vendor/part names
//! - [`response`] - status byte interpretation and firmware versions
//! - [`flash`] - the [`flash::NandDevice`] trait, block programming, dump,
//!   ranged program and diff-driven program
//! - [`badblock`] - bad-block detection in raw PS3 NAND dumps
//!
//! # Example
//!
//! ```ignore
//! use nandway_core::flash::{self, NandDevice, NoProgress, ProgramOptions};
//!
//! fn reflash<D: NandDevice>(device: &mut D, image: &[u8]) -> nandway_core::Result<()> {
//!     let report = flash::program(device, image, ProgramOptions::verified(true), 0, 0, &mut NoProgress)?;
//!     println!("{} blocks programmed", report.blocks_programmed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod badblock;
pub mod chip;
pub mod error;
pub mod flash;
pub mod geometry;
pub mod response;

pub use error::{Error, Result, Severity};
pub use geometry::{ChipGeometry, GeometryError, RawGeometry};
pub use response::{CommandResult, FirmwareInfo, FirmwareVersion, Operation};
