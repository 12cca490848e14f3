//! NAND chip geometry
//!
//! The bridge does not know anything about the attached chip beyond what it
//! reads from the chip's parameter page. The identify command returns a
//! fixed 25-byte payload which is decoded into a [`RawGeometry`], validated,
//! corrected for known quirky parts (see [`crate::chip`]) and only then used
//! to compute the derived sizes in [`ChipGeometry`].
//!
//! All arithmetic is exact integer arithmetic. A payload that would produce a
//! fractional page count per block is rejected, not rounded.

use core::fmt;

use thiserror::Error;

use crate::chip;

/// Length of the identify payload following the capability byte
pub const ID_PAYLOAD_LEN: usize = 25;

/// Page addresses are sent as 3 bytes
pub const MAX_PAGE_COUNT: u64 = 1 << 24;

/// The only supported data bus width
pub const SUPPORTED_BUS_WIDTH: u8 = 8;

/// Reasons an identify payload cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Page size field is zero
    #[error("error reading size of NAND (page size is 0)")]
    ZeroPageSize,
    /// Anything other than an 8-bit part
    #[error("only 8-bit NANDs are supported (bus width {0})")]
    UnsupportedBusWidth(u8),
    /// Manufacturer id is zero
    #[error("unknown chip manufacturer")]
    UnknownManufacturer,
    /// Device id is zero
    #[error("unknown device id")]
    UnknownDevice,
    /// Block size is not a whole number of pages
    #[error("block size {block_size} is not a multiple of page size {page_size}")]
    BlockNotPageMultiple {
        /// Block size in bytes
        block_size: u32,
        /// Page size in bytes
        page_size: u32,
    },
    /// No blocks left after corrections
    #[error("block count is 0")]
    NoBlocks,
    /// A derived size does not fit in 32 bits
    #[error("derived sizes overflow")]
    Overflow,
    /// The chip has more pages than a 3-byte address can reach
    #[error("{0} pages cannot be addressed with 24-bit page numbers")]
    TooManyPages(u64),
}

/// Geometry fields exactly as reported by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawGeometry {
    /// Manufacturer id
    pub manufacturer_id: u8,
    /// Device id
    pub device_id: u8,
    /// Data bytes per page
    pub page_size: u32,
    /// Spare (redundant area) bytes per page
    pub spare_size: u16,
    /// Data bus width in bits
    pub bus_width: u8,
    /// Data bytes per block
    pub block_size: u32,
    /// Number of blocks
    pub block_count: u32,
    /// Number of planes
    pub plane_count: u8,
    /// Plane size as reported
    pub plane_size: u32,
}

impl RawGeometry {
    /// Decode an identify payload
    ///
    /// Layout: 0 manufacturer, 1 device, 5..9 page size, 9..11 spare size,
    /// 11 bus width, 12..16 block size, 16..20 block count, 20 plane count,
    /// 21..25 plane size. Multi-byte fields are big-endian.
    pub fn parse(payload: &[u8; ID_PAYLOAD_LEN]) -> Self {
        let be32 = |at: usize| {
            u32::from_be_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
        };

        Self {
            manufacturer_id: payload[0],
            device_id: payload[1],
            page_size: be32(5),
            spare_size: u16::from_be_bytes([payload[9], payload[10]]),
            bus_width: payload[11],
            block_size: be32(12),
            block_count: be32(16),
            plane_count: payload[20],
            plane_size: be32(21),
        }
    }

    /// Encode as an identify payload (the inverse of [`RawGeometry::parse`])
    pub fn encode(&self) -> [u8; ID_PAYLOAD_LEN] {
        let mut p = [0u8; ID_PAYLOAD_LEN];
        p[0] = self.manufacturer_id;
        p[1] = self.device_id;
        p[5..9].copy_from_slice(&self.page_size.to_be_bytes());
        p[9..11].copy_from_slice(&self.spare_size.to_be_bytes());
        p[11] = self.bus_width;
        p[12..16].copy_from_slice(&self.block_size.to_be_bytes());
        p[16..20].copy_from_slice(&self.block_count.to_be_bytes());
        p[20] = self.plane_count;
        p[21..25].copy_from_slice(&self.plane_size.to_be_bytes());
        p
    }

    /// Check the invariants every supported chip satisfies
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.page_size == 0 {
            return Err(GeometryError::ZeroPageSize);
        }
        if self.bus_width != SUPPORTED_BUS_WIDTH {
            return Err(GeometryError::UnsupportedBusWidth(self.bus_width));
        }
        if self.manufacturer_id == 0 {
            return Err(GeometryError::UnknownManufacturer);
        }
        if self.device_id == 0 {
            return Err(GeometryError::UnknownDevice);
        }
        Ok(())
    }
}

/// Resolved chip geometry
///
/// Built once per session from the identify payload and never modified
/// afterwards. All sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipGeometry {
    raw: RawGeometry,
    pages_per_block: u32,
    page_size_with_spare: u32,
    block_size_with_spare: u32,
    page_count: u32,
}

impl ChipGeometry {
    /// Decode, validate, correct and derive from an identify payload
    pub fn from_id_payload(payload: &[u8; ID_PAYLOAD_LEN]) -> Result<Self, GeometryError> {
        Self::from_raw(RawGeometry::parse(payload))
    }

    /// Validate, correct and derive from raw fields
    ///
    /// Corrections from the quirk table are applied to the raw fields before
    /// any derived value is computed.
    pub fn from_raw(mut raw: RawGeometry) -> Result<Self, GeometryError> {
        raw.validate()?;

        if let Some(quirk) = chip::apply_quirks(&mut raw) {
            log::debug!(
                "Applied geometry correction for {} ({:02X}:{:02X})",
                quirk.part,
                quirk.manufacturer_id,
                quirk.device_id
            );
        }

        if raw.block_size == 0 || raw.block_size % raw.page_size != 0 {
            return Err(GeometryError::BlockNotPageMultiple {
                block_size: raw.block_size,
                page_size: raw.page_size,
            });
        }
        if raw.block_count == 0 {
            return Err(GeometryError::NoBlocks);
        }

        let pages_per_block = raw.block_size / raw.page_size;
        let page_size_with_spare = raw
            .page_size
            .checked_add(u32::from(raw.spare_size))
            .ok_or(GeometryError::Overflow)?;
        let block_size_with_spare = pages_per_block
            .checked_mul(page_size_with_spare)
            .ok_or(GeometryError::Overflow)?;

        let page_count = u64::from(pages_per_block) * u64::from(raw.block_count);
        if page_count > MAX_PAGE_COUNT {
            return Err(GeometryError::TooManyPages(page_count));
        }

        Ok(Self {
            raw,
            pages_per_block,
            page_size_with_spare,
            block_size_with_spare,
            page_count: page_count as u32,
        })
    }

    /// Corrected raw fields
    pub fn raw(&self) -> &RawGeometry {
        &self.raw
    }

    /// Manufacturer id
    pub fn manufacturer_id(&self) -> u8 {
        self.raw.manufacturer_id
    }

    /// Device id
    pub fn device_id(&self) -> u8 {
        self.raw.device_id
    }

    /// Data bytes per page
    pub fn page_size(&self) -> u32 {
        self.raw.page_size
    }

    /// Spare bytes per page
    pub fn spare_size(&self) -> u32 {
        u32::from(self.raw.spare_size)
    }

    /// Data bus width in bits
    pub fn bus_width(&self) -> u8 {
        self.raw.bus_width
    }

    /// Data bytes per block
    pub fn block_size(&self) -> u32 {
        self.raw.block_size
    }

    /// Number of blocks
    pub fn block_count(&self) -> u32 {
        self.raw.block_count
    }

    /// Number of planes
    pub fn plane_count(&self) -> u8 {
        self.raw.plane_count
    }

    /// Plane size
    pub fn plane_size(&self) -> u32 {
        self.raw.plane_size
    }

    /// Pages in one block
    pub fn pages_per_block(&self) -> u32 {
        self.pages_per_block
    }

    /// Bytes transferred per page (data + spare)
    pub fn page_size_with_spare(&self) -> u32 {
        self.page_size_with_spare
    }

    /// Bytes transferred per block (data + spare)
    pub fn block_size_with_spare(&self) -> u32 {
        self.block_size_with_spare
    }

    /// Pages on the whole chip
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Data bytes on the whole chip
    pub fn total_size(&self) -> u64 {
        u64::from(self.raw.block_size) * u64::from(self.raw.block_count)
    }

    /// Bytes on the whole chip including spare areas
    pub fn total_size_with_spare(&self) -> u64 {
        u64::from(self.block_size_with_spare) * u64::from(self.raw.block_count)
    }

    /// Page address of the first page of `block`
    pub fn first_page(&self, block: u32) -> u32 {
        block * self.pages_per_block
    }

    /// Block containing `page`
    pub fn block_of_page(&self, page: u32) -> u32 {
        page / self.pages_per_block
    }
}

impl fmt::Display for ChipGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MIB: u64 = 1024 * 1024;

        writeln!(f, "NAND size:              {} MiB", self.total_size() / MIB)?;
        writeln!(
            f,
            "NAND plus spare size:   {} MiB",
            self.total_size_with_spare() / MIB
        )?;
        writeln!(f, "Page size:              {} bytes", self.page_size())?;
        writeln!(
            f,
            "Page plus spare size:   {} bytes",
            self.page_size_with_spare
        )?;
        writeln!(f, "Block size:             {} bytes", self.block_size())?;
        writeln!(
            f,
            "Block plus spare size:  {} bytes",
            self.block_size_with_spare
        )?;
        writeln!(f, "Spare size:             {} bytes", self.spare_size())?;
        writeln!(f, "Plane size:             {}", self.plane_size())?;
        writeln!(f, "Pages per block:        {}", self.pages_per_block)?;
        writeln!(f, "Number of blocks:       {}", self.block_count())?;
        writeln!(f, "Number of pages:        {}", self.page_count)?;
        writeln!(f, "Number of planes:       {}", self.plane_count())?;
        write!(f, "Bus width:              {}-bit", self.bus_width())
    }
}
