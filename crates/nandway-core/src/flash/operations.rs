//! Block programming and bulk operations
//!
//! Everything here works on any [`NandDevice`]. NAND only allows programming
//! erased pages, so a block is always written as erase, then every page in
//! increasing order, then (optionally) a read-back of every page.
//!
//! Bulk operations distinguish between failures that end the session
//! ([`Error::is_fatal`]) and failures of a single block, which are collected
//! in the returned report while the operation moves on to the next block
//! (unless [`FailurePolicy::Abort`] is selected).

use std::io::Write;

use crate::error::{Error, Result};
use crate::flash::device::NandDevice;
use crate::flash::diff::DiffEntry;

/// Progress reporting for bulk operations
///
/// Byte counts include the spare area.
pub trait Progress {
    /// Called when a dump starts
    fn dumping(&mut self, total_bytes: u64);

    /// Called after each page is read and stored
    fn dump_progress(&mut self, bytes_done: u64);

    /// Called when a program run starts
    fn programming(&mut self, first_block: u32, block_count: u32, total_bytes: u64);

    /// Called after each block is processed, successfully or not
    fn block_done(&mut self, block: u32, bytes_done: u64);

    /// Called when a block fails with a recoverable error
    fn block_failed(&mut self, block: u32, error: &Error);

    /// Called when the operation is complete
    fn finished(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl Progress for NoProgress {
    fn dumping(&mut self, _total_bytes: u64) {}
    fn dump_progress(&mut self, _bytes_done: u64) {}
    fn programming(&mut self, _first_block: u32, _block_count: u32, _total_bytes: u64) {}
    fn block_done(&mut self, _block: u32, _bytes_done: u64) {}
    fn block_failed(&mut self, _block: u32, _error: &Error) {}
    fn finished(&mut self) {}
}

/// What a program run does after a recoverable block failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and continue with the next block
    #[default]
    Continue,
    /// Record the failure and stop
    Abort,
}

/// Options for [`program`] and [`diff_program`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramOptions {
    /// Read back and compare every page after writing
    pub verify: bool,
    /// Behaviour after a recoverable block failure
    pub on_failure: FailurePolicy,
}

impl ProgramOptions {
    /// Options with verification enabled or disabled
    pub fn verified(verify: bool) -> Self {
        Self {
            verify,
            ..Self::default()
        }
    }
}

/// A block that could not be programmed
#[derive(Debug)]
pub struct BlockFailure {
    /// Block index
    pub block: u32,
    /// Why it failed
    pub error: Error,
}

/// Outcome of a program run
#[derive(Debug, Default)]
pub struct ProgramReport {
    /// Blocks erased, written (and verified, if requested) without error
    pub blocks_programmed: u32,
    /// Blocks that failed with a recoverable error
    pub failures: Vec<BlockFailure>,
    /// Whether the run stopped early because of [`FailurePolicy::Abort`]
    pub aborted: bool,
}

impl ProgramReport {
    /// True if every requested block was programmed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }
}

/// Outcome of one diff entry
#[derive(Debug)]
pub struct DiffOutcome {
    /// The entry
    pub entry: DiffEntry,
    /// Program report, or the error that prevented programming
    pub result: Result<ProgramReport>,
}

impl DiffOutcome {
    /// True if the entry's block was programmed
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(report) if report.is_success())
    }
}

/// Outcome of a diff program run, one outcome per entry in file order
#[derive(Debug, Default)]
pub struct DiffReport {
    /// Per-entry outcomes
    pub outcomes: Vec<DiffOutcome>,
}

impl DiffReport {
    /// Number of entries that did not program cleanly
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    /// True if every entry programmed cleanly
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Erase, write and optionally verify one block
///
/// `data` must be exactly one block including spare. The block is erased
/// once, then every page is written in increasing order. With `verify`, every
/// page is read back; the first page that differs ends verification with
/// [`Error::VerifyMismatch`].
///
/// A failure part way through leaves the block in whatever state the last
/// completed command left it; nothing is retried.
pub fn program_block<D: NandDevice + ?Sized>(
    device: &mut D,
    data: &[u8],
    block: u32,
    verify: bool,
) -> Result<()> {
    let geometry = device.geometry();
    let page_len = geometry.page_size_with_spare() as usize;
    let block_len = geometry.block_size_with_spare() as usize;
    let block_count = geometry.block_count();

    if data.len() != block_len {
        return Err(Error::LengthMismatch {
            expected: block_len,
            found: data.len(),
        });
    }
    if block >= block_count {
        return Err(Error::RangeExceedsDevice {
            offset: u64::from(block),
            end: u64::from(block) + 1,
            available: block_count,
        });
    }
    let first_page = geometry.first_page(block);

    log::trace!("Programming block 0x{:X} (first page 0x{:X})", block, first_page);

    device.erase_block(first_page)?;

    for (page, chunk) in (first_page..).zip(data.chunks_exact(page_len)) {
        device.write_page(page, chunk)?;
    }

    if verify {
        let mut readback = vec![0u8; page_len];
        for (page, expected) in (first_page..).zip(data.chunks_exact(page_len)) {
            device.read_page(page, &mut readback)?;
            if readback != expected {
                log::error!(
                    "Block verification failed: block=0x{:X} page=0x{:X}",
                    block,
                    page
                );
                return Err(Error::VerifyMismatch { block, page });
            }
        }
    }

    Ok(())
}

/// Dump raw pages (data + spare) to `out`
///
/// A `block_count` of 0 means the whole chip. The count is clamped to the
/// blocks remaining after `block_offset`. Pages are written in address order.
///
/// Any error ends the dump. Returns the number of bytes written.
pub fn dump<D, W, P>(
    device: &mut D,
    out: &mut W,
    block_offset: u32,
    block_count: u32,
    progress: &mut P,
) -> Result<u64>
where
    D: NandDevice + ?Sized,
    W: Write + ?Sized,
    P: Progress + ?Sized,
{
    let geometry = device.geometry();
    let device_blocks = geometry.block_count();
    let page_len = geometry.page_size_with_spare() as usize;
    let block_len = u64::from(geometry.block_size_with_spare());

    if block_offset >= device_blocks {
        return Err(Error::RangeExceedsDevice {
            offset: u64::from(block_offset),
            end: u64::from(block_offset) + u64::from(block_count.max(1)),
            available: device_blocks,
        });
    }

    let remaining = device_blocks - block_offset;
    let count = if block_count == 0 {
        remaining
    } else if block_count > remaining {
        log::warn!(
            "Requested 0x{:X} blocks but only 0x{:X} remain after offset 0x{:X}, clamping",
            block_count,
            remaining,
            block_offset
        );
        remaining
    } else {
        block_count
    };

    let first_page = geometry.first_page(block_offset);
    let end_page = geometry.first_page(block_offset + count);

    log::info!(
        "Dumping 0x{:X} blocks starting at block 0x{:X}",
        count,
        block_offset
    );
    progress.dumping(u64::from(count) * block_len);

    let mut page_buf = vec![0u8; page_len];
    let mut bytes_done = 0u64;
    for page in first_page..end_page {
        device.read_page(page, &mut page_buf)?;
        out.write_all(&page_buf)?;
        bytes_done += page_len as u64;
        progress.dump_progress(bytes_done);
    }
    out.flush()?;

    progress.finished();
    Ok(bytes_done)
}

/// Program blocks of `data` into the same block positions on the chip
///
/// `data` is a raw image (data + spare per page) starting at block 0. A
/// `block_count` of 0 means every block from `block_offset` to the end of the
/// chip. Before any device I/O the request is checked, in this order:
///
/// 1. the image is a whole number of blocks,
/// 2. `block_offset + block_count` does not exceed the blocks in the image,
/// 3. `block_offset + block_count` does not exceed the blocks on the chip.
///
/// A range ending exactly at either limit is accepted.
///
/// Blocks are programmed in increasing order. Recoverable failures are
/// recorded in the report; fatal errors are returned immediately.
pub fn program<D, P>(
    device: &mut D,
    data: &[u8],
    options: ProgramOptions,
    block_offset: u32,
    block_count: u32,
    progress: &mut P,
) -> Result<ProgramReport>
where
    D: NandDevice + ?Sized,
    P: Progress + ?Sized,
{
    let geometry = device.geometry();
    let block_size = geometry.block_size_with_spare();
    let block_len = block_size as usize;
    let device_blocks = geometry.block_count();

    let count = if block_count == 0 {
        device_blocks.saturating_sub(block_offset)
    } else {
        block_count
    };

    if data.len() % block_len != 0 {
        return Err(Error::ImageNotBlockAligned {
            len: data.len(),
            block_size,
        });
    }

    let image_blocks = (data.len() / block_len) as u64;
    let end = u64::from(block_offset) + u64::from(count);
    if end > image_blocks {
        return Err(Error::RangeExceedsImage {
            offset: u64::from(block_offset),
            end,
            available: image_blocks,
        });
    }
    if end > u64::from(device_blocks) {
        return Err(Error::RangeExceedsDevice {
            offset: u64::from(block_offset),
            end,
            available: device_blocks,
        });
    }

    log::info!(
        "Writing 0x{:X} blocks to device (starting at offset 0x{:X}){}",
        count,
        block_offset,
        if options.verify { " with verify" } else { "" }
    );
    progress.programming(block_offset, count, u64::from(count) * u64::from(block_size));

    let mut report = ProgramReport::default();
    let mut bytes_done = 0u64;

    for block in block_offset..block_offset + count {
        let start = block as usize * block_len;
        let chunk = &data[start..start + block_len];

        match program_block(device, chunk, block, options.verify) {
            Ok(()) => report.blocks_programmed += 1,
            Err(e) if e.is_fatal() => {
                log::error!("Block 0x{:X}: {}", block, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("Block 0x{:X}: {}", block, e);
                progress.block_failed(block, &e);
                report.failures.push(BlockFailure { block, error: e });
                if options.on_failure == FailurePolicy::Abort {
                    report.aborted = true;
                    break;
                }
            }
        }

        bytes_done += u64::from(block_size);
        progress.block_done(block, bytes_done);
    }

    progress.finished();
    Ok(report)
}

/// Reprogram the blocks listed in a diff file
///
/// Each entry is handled independently, in order: its address is converted
/// to a block index and that single block is programmed from `data`. An
/// entry that fails (misaligned address, out of range, block failure) is
/// recorded and the next entry is processed. Fatal errors are returned
/// immediately.
pub fn diff_program<D, P>(
    device: &mut D,
    data: &[u8],
    entries: &[DiffEntry],
    options: ProgramOptions,
    progress: &mut P,
) -> Result<DiffReport>
where
    D: NandDevice + ?Sized,
    P: Progress + ?Sized,
{
    let mut report = DiffReport::default();

    for (idx, entry) in entries.iter().enumerate() {
        let block = entry.block(device.geometry());
        if let Ok(block) = &block {
            log::info!(
                "Programming offset 0x{:X} block 0x{:X} ({}/{})",
                entry.address,
                block,
                idx + 1,
                entries.len()
            );
        }

        let result = block.and_then(|block| program(device, data, options, block, 1, progress));

        match result {
            Err(e) if e.is_fatal() => {
                log::error!("Diff line {}: {}", entry.line, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("Diff line {}: {}", entry.line, e);
                report.outcomes.push(DiffOutcome {
                    entry: *entry,
                    result: Err(e),
                });
            }
            Ok(r) => report.outcomes.push(DiffOutcome {
                entry: *entry,
                result: Ok(r),
            }),
        }
    }

    Ok(report)
}
