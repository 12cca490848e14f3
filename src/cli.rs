//! CLI argument parsing

use clap::{Parser, Subcommand};
use nandway_core::FirmwareVersion;
use nandway_teensy::protocol::{DEFAULT_BAUD, DEFAULT_FIRMWARE};
use nandway_teensy::ChipSelect;
use std::path::PathBuf;

/// Parse a hexadecimal u32, with or without a 0x prefix
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
}

fn parse_chip_select(s: &str) -> Result<ChipSelect, String> {
    s.parse::<u8>()
        .ok()
        .and_then(ChipSelect::from_index)
        .ok_or_else(|| format!("Invalid NAND chip select: {} (expected 0 or 1)", s))
}

#[derive(Parser)]
#[command(name = "nandway")]
#[command(author, version, about = "NAND flasher for the NANDway Teensy bridge", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Serial port of the bridge (e.g., /dev/ttyACM0 or COM3)
    #[arg(short, long, global = true, default_value = "/dev/ttyACM0")]
    pub port: String,

    /// NAND chip select (0 or 1)
    #[arg(short, long, global = true, default_value = "0", value_parser = parse_chip_select)]
    pub nand: ChipSelect,

    /// Leave the bridge pull-up resistors disabled
    #[arg(long, global = true)]
    pub no_pullups: bool,

    /// Serial baud rate
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Firmware version the bridge must report (MAJOR.MINOR)
    #[arg(long, global = true, default_value_t = DEFAULT_FIRMWARE)]
    pub firmware: FirmwareVersion,

    #[command(subcommand)]
    pub command: Commands,
}

/// Block range and source image for programming
#[derive(clap::Args, Debug, Clone)]
pub struct ProgramArgs {
    /// Raw image (data + spare) to program
    pub input: PathBuf,

    /// First block to program (hex)
    #[arg(value_parser = parse_hex_u32)]
    pub offset: Option<u32>,

    /// Number of blocks to program (hex, 0 = up to the end of the chip)
    #[arg(value_parser = parse_hex_u32)]
    pub length: Option<u32>,

    /// Stop at the first block that fails instead of continuing
    #[arg(long)]
    pub abort_on_error: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show bridge and NAND information
    Info,

    /// Dump raw NAND contents (data + spare) to a file
    Dump {
        /// Output file path
        output: PathBuf,

        /// First block to dump (hex)
        #[arg(value_parser = parse_hex_u32)]
        offset: Option<u32>,

        /// Number of blocks to dump (hex, 0 = up to the end of the chip)
        #[arg(value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Program a raw image
    Write(ProgramArgs),

    /// Program a raw image and verify every page
    Vwrite(ProgramArgs),

    /// Program only the blocks listed in a diff file
    Diffwrite {
        /// Raw image (data + spare) holding the new contents
        input: PathBuf,

        /// Diff file with one 0x<address> per line
        diff: PathBuf,
    },

    /// Program only the blocks listed in a diff file and verify them
    Vdiffwrite {
        /// Raw image (data + spare) holding the new contents
        input: PathBuf,

        /// Diff file with one 0x<address> per line
        diff: PathBuf,
    },

    /// Reboot the bridge into its bootloader
    Bootloader,

    /// List bad blocks in a raw PS3 NAND dump (no bridge needed)
    Ps3badblocks {
        /// Raw dump file
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u32("10"), Ok(0x10));
        assert_eq!(parse_hex_u32("0x1FF"), Ok(0x1FF));
        assert!(parse_hex_u32("xyz").is_err());
    }

    #[test]
    fn test_parse_dump_args() {
        let cli = Cli::try_parse_from(["nandway", "--nand", "1", "dump", "out.bin", "20", "4"]).unwrap();
        assert_eq!(cli.nand, ChipSelect::Nand1);
        match cli.command {
            Commands::Dump {
                output,
                offset,
                length,
            } => {
                assert_eq!(output, PathBuf::from("out.bin"));
                assert_eq!(offset, Some(0x20));
                assert_eq!(length, Some(4));
            }
            _ => panic!("expected dump"),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["nandway", "info"]).unwrap();
        assert_eq!(cli.port, "/dev/ttyACM0");
        assert_eq!(cli.nand, ChipSelect::Nand0);
        assert_eq!(cli.baud, 9600);
        assert_eq!(cli.firmware, FirmwareVersion::new(0, 65));
        assert!(!cli.no_pullups);
    }

    #[test]
    fn test_bad_chip_select() {
        assert!(Cli::try_parse_from(["nandway", "--nand", "2", "info"]).is_err());
    }
}
