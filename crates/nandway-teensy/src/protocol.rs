//! NANDway bridge protocol constants and types
//!
//! Every command is a single opcode byte. Page commands are followed by a
//! 3-byte little-endian page address (and, for writes, one page of data
//! including spare). Page commands end with a single status byte, see
//! [`nandway_core::response`].

use std::time::Duration;

use nandway_core::{FirmwareInfo, FirmwareVersion};

/// Firmware revision this driver speaks
pub const DEFAULT_FIRMWARE: FirmwareVersion = FirmwareVersion::new(0, 65);

/// Serial baud rate (the Teensy is a USB CDC device, so this is nominal)
pub const DEFAULT_BAUD: u32 = 9600;

/// Reads wait this long (erasing and programming large chips is slow)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Writes wait this long
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(120);

// Command opcodes
/// First ping marker
pub const CMD_PING1: u8 = 0;
/// Second ping marker
pub const CMD_PING2: u8 = 1;
/// Reboot the bridge into its bootloader
pub const CMD_BOOTLOADER: u8 = 2;
/// Lock the bridge I/O lines
pub const CMD_IO_LOCK: u8 = 3;
/// Release the bridge I/O lines
pub const CMD_IO_RELEASE: u8 = 4;
/// Disable the pull-up resistors
pub const CMD_PULLUPS_DISABLE: u8 = 5;
/// Enable the pull-up resistors
pub const CMD_PULLUPS_ENABLE: u8 = 6;
/// Identify NAND0
pub const CMD_NAND0_ID: u8 = 7;
/// Read a page from NAND0
pub const CMD_NAND0_READPAGE: u8 = 8;
/// Write a page to NAND0
pub const CMD_NAND0_WRITEPAGE: u8 = 9;
/// Erase a block on NAND0
pub const CMD_NAND0_ERASEBLOCK: u8 = 10;
/// Identify NAND1
pub const CMD_NAND1_ID: u8 = 11;
/// Read a page from NAND1
pub const CMD_NAND1_READPAGE: u8 = 12;
/// Write a page to NAND1
pub const CMD_NAND1_WRITEPAGE: u8 = 13;
/// Erase a block on NAND1
pub const CMD_NAND1_ERASEBLOCK: u8 = 14;

/// Capability byte preceding the identify payload
pub const IDENTIFY_SUPPORTED: u8 = b'Y';

/// Length of the ping reply
pub const PING_REPLY_LEN: usize = 4;

/// Length of an encoded page address
pub const PAGE_ADDRESS_LEN: usize = 3;

/// Opcodes for one chip select line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipOpcodes {
    /// Identify
    pub identify: u8,
    /// Read page
    pub read_page: u8,
    /// Write page
    pub write_page: u8,
    /// Erase block
    pub erase_block: u8,
}

/// Chip select line on the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipSelect {
    /// First NAND
    #[default]
    Nand0,
    /// Second NAND
    Nand1,
}

impl ChipSelect {
    /// Chip select from its line number
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ChipSelect::Nand0),
            1 => Some(ChipSelect::Nand1),
            _ => None,
        }
    }

    /// Line number
    pub fn index(self) -> u8 {
        match self {
            ChipSelect::Nand0 => 0,
            ChipSelect::Nand1 => 1,
        }
    }

    /// Opcodes addressing this chip
    pub fn opcodes(self) -> ChipOpcodes {
        match self {
            ChipSelect::Nand0 => ChipOpcodes {
                identify: CMD_NAND0_ID,
                read_page: CMD_NAND0_READPAGE,
                write_page: CMD_NAND0_WRITEPAGE,
                erase_block: CMD_NAND0_ERASEBLOCK,
            },
            ChipSelect::Nand1 => ChipOpcodes {
                identify: CMD_NAND1_ID,
                read_page: CMD_NAND1_READPAGE,
                write_page: CMD_NAND1_WRITEPAGE,
                erase_block: CMD_NAND1_ERASEBLOCK,
            },
        }
    }
}

/// Encode a page number as a 24-bit little-endian address
pub fn encode_page_address(page: u32) -> [u8; PAGE_ADDRESS_LEN] {
    debug_assert!(page < 1 << 24, "page 0x{:X} exceeds 24 bits", page);
    let b = page.to_le_bytes();
    [b[0], b[1], b[2]]
}

/// Decode a 24-bit little-endian page address
pub fn decode_page_address(buf: &[u8; PAGE_ADDRESS_LEN]) -> u32 {
    (buf[0] as u32) | ((buf[1] as u32) << 8) | ((buf[2] as u32) << 16)
}

/// Opcode followed by page address
pub fn encode_page_command(opcode: u8, page: u32) -> [u8; 1 + PAGE_ADDRESS_LEN] {
    let addr = encode_page_address(page);
    [opcode, addr[0], addr[1], addr[2]]
}

/// Decode a ping reply: major, minor, free memory (big-endian)
pub fn decode_ping(reply: &[u8; PING_REPLY_LEN]) -> FirmwareInfo {
    FirmwareInfo {
        version: FirmwareVersion::new(reply[0], reply[1]),
        free_memory: u16::from_be_bytes([reply[2], reply[3]]),
    }
}
