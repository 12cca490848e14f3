//! Diff files
//!
//! A diff file lists the byte offsets, within a full-chip image, of the
//! blocks that changed. One `0x<hex>` address per line; blank lines are
//! ignored. Every address must be the start of a block (block size including
//! spare), which is checked per entry against the chip geometry.

use crate::error::{Error, Result};
use crate::geometry::ChipGeometry;

/// One block to reprogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEntry {
    /// Byte offset into the source image
    pub address: u64,
    /// 1-based line number in the diff file
    pub line: usize,
}

impl DiffEntry {
    /// Block index this entry designates
    ///
    /// # Errors
    /// * `MisalignedAddress` - If the address is not on a block boundary
    pub fn block(&self, geometry: &ChipGeometry) -> Result<u32> {
        let block_size = geometry.block_size_with_spare();
        if self.address % u64::from(block_size) != 0 {
            return Err(Error::MisalignedAddress {
                address: self.address,
                block_size,
            });
        }

        let block = self.address / u64::from(block_size);
        u32::try_from(block).map_err(|_| Error::RangeExceedsDevice {
            offset: block,
            end: block.saturating_add(1),
            available: geometry.block_count(),
        })
    }
}

/// Parse the contents of a diff file
///
/// Entries are returned in file order. Lines that are not `0x` followed by
/// hexadecimal digits are rejected with the offending line number.
pub fn parse_diff(text: &str) -> Result<Vec<DiffEntry>> {
    let mut entries = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let invalid = || Error::InvalidDiffLine {
            line: idx + 1,
            text: raw.to_string(),
        };

        let hex = line
            .strip_prefix("0x")
            .or_else(|| line.strip_prefix("0X"))
            .ok_or_else(invalid)?;
        let address = u64::from_str_radix(hex, 16).map_err(|_| invalid())?;

        entries.push(DiffEntry {
            address,
            line: idx + 1,
        });
    }

    log::debug!("Parsed {} diff entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RawGeometry;

    fn geometry() -> ChipGeometry {
        ChipGeometry::from_raw(RawGeometry {
            manufacturer_id: 0xEC,
            device_id: 0xF1,
            page_size: 2048,
            spare_size: 64,
            bus_width: 8,
            block_size: 128 * 1024,
            block_count: 1024,
            plane_count: 1,
            plane_size: 128 * 1024 * 1024,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_diff() {
        let text = "0x0\n0x21000\r\n\n  0X42000  \n";
        let entries = parse_diff(text).unwrap();
        assert_eq!(
            entries,
            vec![
                DiffEntry { address: 0, line: 1 },
                DiffEntry { address: 0x21000, line: 2 },
                DiffEntry { address: 0x42000, line: 4 },
            ]
        );
    }

    #[test]
    fn test_parse_diff_rejects_garbage() {
        match parse_diff("0x0\n21000\n") {
            Err(Error::InvalidDiffLine { line, text }) => {
                assert_eq!(line, 2);
                assert_eq!(text, "21000");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_diff("0xZZ"),
            Err(Error::InvalidDiffLine { line: 1, .. })
        ));
        assert!(matches!(
            parse_diff("0x"),
            Err(Error::InvalidDiffLine { line: 1, .. })
        ));
    }

    #[test]
    fn test_entry_block() {
        let geo = geometry();
        // 64 pages * 2112 bytes
        assert_eq!(geo.block_size_with_spare(), 0x21000);

        let entry = DiffEntry { address: 0x42000, line: 1 };
        assert_eq!(entry.block(&geo).unwrap(), 2);

        let entry = DiffEntry { address: 0x42001, line: 1 };
        match entry.block(&geo) {
            Err(Error::MisalignedAddress { address, block_size }) => {
                assert_eq!(address, 0x42001);
                assert_eq!(block_size, 0x21000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_entry_block_beyond_page_address_space() {
        // One-byte pages and blocks make every address aligned
        let geo = ChipGeometry::from_raw(RawGeometry {
            manufacturer_id: 0xEC,
            device_id: 0xF1,
            page_size: 1,
            spare_size: 0,
            bus_width: 8,
            block_size: 1,
            block_count: 16,
            plane_count: 1,
            plane_size: 16,
        })
        .unwrap();
        assert_eq!(geo.block_size_with_spare(), 1);

        let entries = parse_diff("0xFFFFFFFFFFFFFFFF").unwrap();
        match entries[0].block(&geo) {
            Err(Error::RangeExceedsDevice { offset, end, available }) => {
                assert_eq!(offset, u64::MAX);
                assert_eq!(end, u64::MAX);
                assert_eq!(available, 16);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
