//! CLI command implementations
//!
//! Every bridge command runs against an identified [`NandDevice`], so the
//! same code drives the serial bridge and the emulator.

mod progress;

use nandway_core::badblock::{find_bad_blocks, PS3_NAND};
use nandway_core::chip::{part_name, vendor_name};
use nandway_core::flash::{self, parse_diff, FailurePolicy, NandDevice, ProgramOptions};
use nandway_core::FirmwareInfo;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

pub use progress::IndicatifProgress;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Print the chip report
pub fn print_info<D: NandDevice + ?Sized>(device: &D, nand: u8, firmware: &FirmwareInfo) {
    let geometry = device.geometry();
    let mfg = geometry.manufacturer_id();
    let dev = geometry.device_id();

    println!("Bridge {}", firmware);
    println!();
    println!("NAND{} information:", nand);
    println!(
        "NAND chip manufacturer: {} (0x{:02x})",
        vendor_name(mfg).unwrap_or("unknown"),
        mfg
    );
    println!(
        "NAND chip type:         {} (0x{:02x})",
        part_name(mfg, dev).unwrap_or("unknown"),
        dev
    );
    println!();
    println!("{}", geometry);
    println!();
}

/// Dump `length` blocks starting at `offset` to `output`
pub fn run_dump<D: NandDevice + ?Sized>(
    device: &mut D,
    output: &Path,
    offset: u32,
    length: u32,
) -> CmdResult {
    let file = File::create(output).map_err(|e| format!("{}: {}", output.display(), e))?;
    let mut writer = BufWriter::new(file);

    println!("Dumping...");
    let mut progress = IndicatifProgress::new();
    let written = flash::dump(device, &mut writer, offset, length, &mut progress)?;

    println!("Wrote {} bytes to {:?}", written, output);
    Ok(())
}

/// Program `length` blocks of `input` starting at `offset`
pub fn run_write<D: NandDevice + ?Sized>(
    device: &mut D,
    input: &Path,
    offset: u32,
    length: u32,
    options: ProgramOptions,
) -> CmdResult {
    let data = read_file(input)?;

    println!("Writing...");
    let mut progress = IndicatifProgress::new();
    let report = flash::program(device, &data, options, offset, length, &mut progress)?;

    println!("{} block(s) programmed", report.blocks_programmed);
    if !report.is_success() {
        for failure in &report.failures {
            eprintln!("  block 0x{:X}: {}", failure.block, failure.error);
        }
        if report.aborted {
            return Err("write aborted after a failed block".into());
        }
        return Err(format!("{} block(s) failed", report.failures.len()).into());
    }
    Ok(())
}

/// Program the blocks named in `diff` from `input`
pub fn run_diffwrite<D: NandDevice + ?Sized>(
    device: &mut D,
    input: &Path,
    diff: &Path,
    verify: bool,
) -> CmdResult {
    let data = read_file(input)?;
    let text = fs::read_to_string(diff).map_err(|e| format!("{}: {}", diff.display(), e))?;
    let entries = parse_diff(&text)?;

    println!("Writing using diff file ({} entries)...", entries.len());
    let options = ProgramOptions {
        verify,
        on_failure: FailurePolicy::Continue,
    };
    let mut progress = IndicatifProgress::new();
    let report = flash::diff_program(device, &data, &entries, options, &mut progress)?;

    let failed = report.failed();
    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        match &outcome.result {
            Err(e) => eprintln!("  line {} (0x{:X}): {}", outcome.entry.line, outcome.entry.address, e),
            Ok(r) => {
                for failure in &r.failures {
                    eprintln!(
                        "  line {} (0x{:X}): {}",
                        outcome.entry.line, outcome.entry.address, failure.error
                    );
                }
            }
        }
    }

    println!(
        "{} of {} entries programmed",
        report.outcomes.len() - failed,
        report.outcomes.len()
    );
    if failed > 0 {
        return Err(format!("{} diff entries failed", failed).into());
    }
    Ok(())
}

/// List bad blocks in a PS3 NAND dump
pub fn run_ps3badblocks(input: &Path) -> CmdResult {
    let data = read_file(input)?;

    let bad = find_bad_blocks(&data, &PS3_NAND);
    for block in &bad {
        println!("Invalid block: {} (0x{:X})", block, block);
    }
    println!("{} bad block(s) found", bad.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nandway_dummy::DummyBridge;
    use nandway_teensy::{Bridge, ChipSelect, Session, SessionConfig};
    use std::path::PathBuf;

    // Default emulated chip: 16 blocks of 4 * 264 bytes
    const BLOCK_LEN: usize = 1056;
    const CHIP_LEN: usize = 16 * BLOCK_LEN;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("nandway-{}-{}", std::process::id(), name))
    }

    fn open(dummy: &DummyBridge) -> Session<DummyBridge> {
        Bridge::new(dummy.clone(), SessionConfig::default())
            .unwrap()
            .identify()
            .unwrap()
    }

    #[test]
    fn test_dump_then_write_back() {
        let image: Vec<u8> = (0..CHIP_LEN).map(|i| (i % 253) as u8).collect();
        let source = DummyBridge::new_default();
        source.load(ChipSelect::Nand0, 0, &image);

        let path = temp_path("dump.bin");
        run_dump(&mut open(&source), &path, 0, 0).unwrap();
        assert_eq!(fs::read(&path).unwrap(), image);

        let target = DummyBridge::new_default();
        run_write(&mut open(&target), &path, 0, 0, ProgramOptions::verified(true)).unwrap();
        assert_eq!(target.memory(ChipSelect::Nand0), image);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_rejects_partial_block_image() {
        let path = temp_path("short.bin");
        fs::write(&path, vec![0u8; BLOCK_LEN + 1]).unwrap();

        let dummy = DummyBridge::new_default();
        let err = run_write(&mut open(&dummy), &path, 0, 1, ProgramOptions::default()).unwrap_err();
        assert!(err.to_string().contains("not a multiple"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_diffwrite_fails_on_bad_entry() {
        let image = temp_path("diff-image.bin");
        let diff = temp_path("diff.txt");
        fs::write(&image, vec![0x5Au8; CHIP_LEN]).unwrap();
        fs::write(&diff, "0x420\n0x10\n").unwrap();

        let dummy = DummyBridge::new_default();
        let err = run_diffwrite(&mut open(&dummy), &image, &diff, true).unwrap_err();
        assert_eq!(err.to_string(), "1 diff entries failed");

        // The aligned entry was still programmed
        let memory = dummy.memory(ChipSelect::Nand0);
        assert!(memory[BLOCK_LEN..2 * BLOCK_LEN].iter().all(|&b| b == 0x5A));

        let _ = fs::remove_file(&image);
        let _ = fs::remove_file(&diff);
    }

    #[test]
    fn test_ps3badblocks_missing_file() {
        assert!(run_ps3badblocks(&temp_path("does-not-exist.bin")).is_err());
    }
}
