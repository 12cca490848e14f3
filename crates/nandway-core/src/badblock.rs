//! Bad-block detection in raw PS3 NAND dumps
//!
//! A raw dump stores every page followed by its spare area. Factory bad
//! blocks carry a non-0xFF marker in the first spare byte of page 0 or
//! page 1. This works on an image in memory and never talks to the bridge.

/// Page layout of a raw dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpLayout {
    /// Data bytes per page
    pub page_size: usize,
    /// Bytes per page including spare
    pub page_size_with_spare: usize,
    /// Pages per block
    pub pages_per_block: usize,
    /// Blocks on the chip
    pub block_count: usize,
}

impl DumpLayout {
    /// Bytes per block including spare
    pub const fn block_size_with_spare(&self) -> usize {
        self.page_size_with_spare * self.pages_per_block
    }
}

/// The 256 MiB NAND used by the PS3
pub const PS3_NAND: DumpLayout = DumpLayout {
    page_size: 2048,
    page_size_with_spare: 2112,
    pages_per_block: 64,
    block_count: 1024,
};

/// Block that is never reported bad on a PS3 NAND
pub const PS3_SKIPPED_BLOCK: u32 = 0x1FF;

/// Check the bad-block markers of one block
///
/// `block_data` must hold at least the first two pages of the block.
pub fn is_good_block(block_data: &[u8], layout: &DumpLayout, block: u32) -> bool {
    if block == PS3_SKIPPED_BLOCK {
        return true;
    }

    let marker0 = block_data[layout.page_size];
    let marker1 = block_data[layout.page_size_with_spare + layout.page_size];
    marker0 == 0xFF && marker1 == 0xFF
}

/// Return the indices of all bad blocks in a raw dump
///
/// Only whole blocks present in `image` (up to `layout.block_count`) are
/// examined.
pub fn find_bad_blocks(image: &[u8], layout: &DumpLayout) -> Vec<u32> {
    let block_len = layout.block_size_with_spare();
    let present = image.len() / block_len;
    if present < layout.block_count {
        log::warn!(
            "Image holds {} complete blocks, expected {}",
            present,
            layout.block_count
        );
    }

    image
        .chunks_exact(block_len)
        .take(layout.block_count)
        .zip(0u32..)
        .filter(|(data, block)| !is_good_block(data, layout, *block))
        .map(|(_, block)| block)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: DumpLayout = DumpLayout {
        page_size: 8,
        page_size_with_spare: 10,
        pages_per_block: 4,
        block_count: 6,
    };

    #[test]
    fn test_clean_image_has_no_bad_blocks() {
        let image = vec![0xFF; SMALL.block_size_with_spare() * SMALL.block_count];
        assert!(find_bad_blocks(&image, &SMALL).is_empty());
    }

    #[test]
    fn test_markers_in_either_page() {
        let mut image = vec![0xFF; SMALL.block_size_with_spare() * SMALL.block_count];
        // Block 1, page 0 marker
        image[40 + 8] = 0x00;
        // Block 4, page 1 marker
        image[160 + 10 + 8] = 0x12;
        // Block 5, second spare byte of page 0 is not a marker
        image[200 + 9] = 0x00;
        assert_eq!(find_bad_blocks(&image, &SMALL), vec![1, 4]);
    }

    #[test]
    fn test_truncated_image() {
        let mut image = vec![0xFF; SMALL.block_size_with_spare() * 2 + 5];
        image[8] = 0;
        assert_eq!(find_bad_blocks(&image, &SMALL), vec![0]);
    }

    #[test]
    fn test_ps3_skipped_block() {
        let mut block = vec![0xFF; PS3_NAND.block_size_with_spare()];
        block[PS3_NAND.page_size] = 0x00;
        assert!(!is_good_block(&block, &PS3_NAND, 0x1FE));
        assert!(is_good_block(&block, &PS3_NAND, PS3_SKIPPED_BLOCK));
    }
}
