//! Known NAND parts
//!
//! Two tables live here. [`QUIRKS`] holds geometry corrections for parts
//! whose parameter page does not describe the chip as seen through the
//! bridge; each entry is keyed by (manufacturer id, device id) and carries an
//! adjustment over the raw identify fields. [`VENDORS`] is purely
//! informational and maps ids to human-readable names.

use crate::geometry::RawGeometry;

/// Geometry correction for one part
#[derive(Debug, Clone, Copy)]
pub struct ChipQuirk {
    /// Manufacturer id
    pub manufacturer_id: u8,
    /// Device id
    pub device_id: u8,
    /// Part name, for logging
    pub part: &'static str,
    /// Adjustment applied to the raw fields before derivation
    pub adjust: fn(&mut RawGeometry),
}

/// Geometry corrections, keyed by (manufacturer id, device id)
pub static QUIRKS: &[ChipQuirk] = &[ChipQuirk {
    manufacturer_id: 0x98,
    device_id: 0xDC,
    part: "TC58NVG2S3E",
    adjust: quarter_blocks_and_planes,
}];

fn quarter_blocks_and_planes(raw: &mut RawGeometry) {
    raw.block_count /= 4;
    raw.plane_size /= 4;
}

/// Look up the correction for a part
pub fn find_quirk(manufacturer_id: u8, device_id: u8) -> Option<&'static ChipQuirk> {
    QUIRKS
        .iter()
        .find(|q| q.manufacturer_id == manufacturer_id && q.device_id == device_id)
}

/// Apply the correction matching `raw`, if any, and return it
pub fn apply_quirks(raw: &mut RawGeometry) -> Option<&'static ChipQuirk> {
    let quirk = find_quirk(raw.manufacturer_id, raw.device_id)?;
    (quirk.adjust)(raw);
    Some(quirk)
}

/// A manufacturer and the parts we can name
#[derive(Debug, Clone, Copy)]
pub struct KnownVendor {
    /// Manufacturer id
    pub id: u8,
    /// Vendor name
    pub name: &'static str,
    /// (device id, part name) pairs
    pub parts: &'static [(u8, &'static str)],
}

/// Names of parts seen in PS3, Xbox 360 and Wii consoles
pub static VENDORS: &[KnownVendor] = &[
    KnownVendor {
        id: 0xEC,
        name: "Samsung",
        parts: &[
            (0xA1, "K9F1G08R0A"),
            (0xD5, "K9GAG08U0M"),
            (0xF1, "K9F1G08U0A"),
            (0x79, "K9T1G08U0M"),
            (0xDA, "K9F2G08U0M"),
        ],
    },
    KnownVendor {
        id: 0xAD,
        name: "Hynix",
        parts: &[
            (0x73, "HY27US08281A"),
            (0xD7, "H27UBG8T2A"),
            (0xDA, "HY27UF082G2B"),
            (0xDC, "H27U4G8F2D"),
        ],
    },
    KnownVendor {
        id: 0x98,
        name: "Toshiba",
        parts: &[(0xDC, "TC58NVG2S3E")],
    },
];

/// Vendor name for a manufacturer id
pub fn vendor_name(manufacturer_id: u8) -> Option<&'static str> {
    VENDORS
        .iter()
        .find(|v| v.id == manufacturer_id)
        .map(|v| v.name)
}

/// Part name for a (manufacturer id, device id) pair
pub fn part_name(manufacturer_id: u8, device_id: u8) -> Option<&'static str> {
    VENDORS
        .iter()
        .find(|v| v.id == manufacturer_id)?
        .parts
        .iter()
        .find(|(id, _)| *id == device_id)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(manufacturer_id: u8, device_id: u8) -> RawGeometry {
        RawGeometry {
            manufacturer_id,
            device_id,
            page_size: 4096,
            spare_size: 128,
            bus_width: 8,
            block_size: 256 * 1024,
            block_count: 4096,
            plane_count: 2,
            plane_size: 0x4000_0000,
        }
    }

    #[test]
    fn test_toshiba_quirk_divides_by_four() {
        let mut r = raw(0x98, 0xDC);
        let quirk = apply_quirks(&mut r).expect("quirk should match");
        assert_eq!(quirk.part, "TC58NVG2S3E");
        assert_eq!(r.block_count, 1024);
        assert_eq!(r.plane_size, 0x1000_0000);
        // Other fields untouched
        assert_eq!(r.page_size, 4096);
        assert_eq!(r.block_size, 256 * 1024);
    }

    #[test]
    fn test_no_quirk_for_other_parts() {
        // Same device id, different vendor
        let mut r = raw(0xAD, 0xDC);
        assert!(apply_quirks(&mut r).is_none());
        assert_eq!(r, raw(0xAD, 0xDC));
    }

    #[test]
    fn test_names() {
        assert_eq!(vendor_name(0xEC), Some("Samsung"));
        assert_eq!(part_name(0xEC, 0xF1), Some("K9F1G08U0A"));
        assert_eq!(part_name(0xAD, 0xDC), Some("H27U4G8F2D"));
        assert_eq!(part_name(0x98, 0xDC), Some("TC58NVG2S3E"));
        assert_eq!(part_name(0x98, 0x01), None);
        assert_eq!(vendor_name(0x2C), None);
        assert_eq!(part_name(0x2C, 0xDA), None);
    }
}
