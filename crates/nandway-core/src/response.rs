//! Bridge responses
//!
//! Every page and block command ends with a single status byte. This module
//! turns that byte into a [`CommandResult`] and decides whether it ends the
//! session. It also holds the firmware version reported by ping.

use core::fmt;

use crate::error::{Error, Result};

/// 'K' - command completed
pub const STATUS_OK: u8 = b'K';
/// 'T' - RY/BY timeout while writing
pub const STATUS_WRITE_TIMEOUT: u8 = b'T';
/// 'R' - bridge receive buffer timeout
pub const STATUS_RECEIVE_TIMEOUT: u8 = b'R';
/// 'V' - bridge-side verification error
pub const STATUS_VERIFY_FAILED: u8 = b'V';
/// 'P' - chip is write-protected
pub const STATUS_WRITE_PROTECTED: u8 = b'P';

/// Interpreted status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// Command completed
    Ok,
    /// The chip did not become ready while writing
    WriteTimeout,
    /// The bridge gave up waiting for command bytes; it needs a reconnect
    ReceiveBufferTimeout,
    /// The bridge reported a verification error
    VerificationFailed,
    /// The chip is write-protected
    WriteProtected,
    /// A status byte outside the protocol
    Unknown(u8),
}

impl CommandResult {
    /// Interpret a status byte
    pub fn from_status(status: u8) -> Self {
        match status {
            STATUS_OK => CommandResult::Ok,
            STATUS_WRITE_TIMEOUT => CommandResult::WriteTimeout,
            STATUS_RECEIVE_TIMEOUT => CommandResult::ReceiveBufferTimeout,
            STATUS_VERIFY_FAILED => CommandResult::VerificationFailed,
            STATUS_WRITE_PROTECTED => CommandResult::WriteProtected,
            other => CommandResult::Unknown(other),
        }
    }

    /// The status byte the bridge sends for this result
    pub fn status_byte(self) -> u8 {
        match self {
            CommandResult::Ok => STATUS_OK,
            CommandResult::WriteTimeout => STATUS_WRITE_TIMEOUT,
            CommandResult::ReceiveBufferTimeout => STATUS_RECEIVE_TIMEOUT,
            CommandResult::VerificationFailed => STATUS_VERIFY_FAILED,
            CommandResult::WriteProtected => STATUS_WRITE_PROTECTED,
            CommandResult::Unknown(b) => b,
        }
    }

    /// Whether this result terminates the session
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            CommandResult::ReceiveBufferTimeout | CommandResult::Unknown(_)
        )
    }

    /// Turn this result into an error for `op` on `page`, or `Ok(())`
    pub fn into_result(self, op: Operation, page: u32) -> Result<()> {
        match self {
            CommandResult::Ok => Ok(()),
            result => Err(Error::Command { op, page, result }),
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::WriteTimeout => write!(f, "RY/BY timeout error while writing"),
            Self::ReceiveBufferTimeout => write!(
                f,
                "bridge receive buffer timeout (disconnect and reconnect the bridge)"
            ),
            Self::VerificationFailed => write!(f, "verification error"),
            Self::WriteProtected => write!(f, "device is write-protected"),
            Self::Unknown(b) => write!(f, "unknown status 0x{:02X}", b),
        }
    }
}

/// Command that produced a status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read page
    ReadPage,
    /// Write page
    WritePage,
    /// Erase block
    EraseBlock,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadPage => write!(f, "Read"),
            Self::WritePage => write!(f, "Write"),
            Self::EraseBlock => write!(f, "Erase"),
        }
    }
}

/// Firmware protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl FirmwareVersion {
    /// Create a version
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

impl core::str::FromStr for FirmwareVersion {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("Invalid firmware version: {}", s))?;
        let major = major
            .parse()
            .map_err(|_| format!("Invalid major version: {}", major))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("Invalid minor version: {}", minor))?;
        Ok(Self { major, minor })
    }
}

/// Ping reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Firmware version reported by the bridge
    pub version: FirmwareVersion,
    /// Free RAM on the bridge, in bytes
    pub free_memory: u16,
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware v{}, {} bytes free",
            self.version, self.free_memory
        )
    }
}
