//! NAND device trait
//!
//! This module provides the `NandDevice` trait: the page and block primitives
//! every higher-level operation is built from. The Teensy bridge session
//! implements it over the serial protocol; tests implement it in memory.

use crate::error::{Error, Result};
use crate::geometry::ChipGeometry;

/// Page-level access to an identified NAND chip
///
/// Page numbers are absolute page addresses (block * pages per block + page
/// in block). Page buffers always include the spare area, so their length is
/// [`ChipGeometry::page_size_with_spare`].
///
/// # Example
///
/// ```ignore
/// use nandway_core::flash::NandDevice;
///
/// fn read_first_page<D: NandDevice>(device: &mut D) -> Result<Vec<u8>> {
///     let mut buf = vec![0u8; device.geometry().page_size_with_spare() as usize];
///     device.read_page(0, &mut buf)?;
///     Ok(buf)
/// }
/// ```
pub trait NandDevice {
    /// Geometry resolved when the chip was identified
    fn geometry(&self) -> &ChipGeometry;

    /// Read one page (data + spare) into `buf`
    ///
    /// # Errors
    /// * `LengthMismatch` - If `buf` is not exactly one page with spare
    /// * `Command` - If the bridge reports a non-OK status
    fn read_page(&mut self, page: u32, buf: &mut [u8]) -> Result<()>;

    /// Program one page (data + spare) from `data`
    ///
    /// # Errors
    /// * `LengthMismatch` - If `data` is not exactly one page with spare;
    ///   nothing is sent to the device in that case
    /// * `Command` - If the bridge reports a non-OK status
    fn write_page(&mut self, page: u32, data: &[u8]) -> Result<()>;

    /// Erase the block whose first page is `page`
    fn erase_block(&mut self, page: u32) -> Result<()>;
}

impl<D: NandDevice + ?Sized> NandDevice for &mut D {
    fn geometry(&self) -> &ChipGeometry {
        (**self).geometry()
    }

    fn read_page(&mut self, page: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_page(page, buf)
    }

    fn write_page(&mut self, page: u32, data: &[u8]) -> Result<()> {
        (**self).write_page(page, data)
    }

    fn erase_block(&mut self, page: u32) -> Result<()> {
        (**self).erase_block(page)
    }
}

/// Check that `len` is exactly one page including spare
pub fn check_page_len(geometry: &ChipGeometry, len: usize) -> Result<()> {
    let expected = geometry.page_size_with_spare() as usize;
    if len != expected {
        return Err(Error::LengthMismatch {
            expected,
            found: len,
        });
    }
    Ok(())
}
