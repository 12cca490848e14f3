//! Error types for nandway-core
//!
//! A single error type is shared by every layer of the driver. Each variant
//! belongs to one class of the failure taxonomy, exposed through
//! [`Error::severity`]:
//!
//! - transport failures (the link is unusable),
//! - protocol failures (the bridge said something we cannot continue from),
//! - recoverable failures (one page or block failed, the session is fine),
//! - input errors (rejected before any device I/O).

use thiserror::Error;

use crate::geometry::GeometryError;
use crate::response::{CommandResult, FirmwareVersion, Operation};

/// Failure class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The byte channel failed; the session cannot continue
    Transport,
    /// The bridge violated the protocol or reported a fatal condition
    Protocol,
    /// A single page or block operation failed
    Recoverable,
    /// The request was rejected before touching the device
    Input,
}

impl Severity {
    /// Whether this class of failure ends the session
    pub fn is_fatal(self) -> bool {
        matches!(self, Severity::Transport | Severity::Protocol)
    }
}

/// Driver error
#[derive(Debug, Error)]
pub enum Error {
    // Transport errors
    /// Failed to open the serial device
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A read or write did not complete within its timeout
    #[error("Communication timeout")]
    Timeout,

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// The link was closed, either explicitly or after a fatal error
    #[error("Session closed")]
    SessionClosed,

    // Protocol errors
    /// The bridge runs a firmware revision we do not speak
    #[error("Ping failed (expected v{expected}, got v{found})")]
    FirmwareMismatch {
        /// Version configured for this session
        expected: FirmwareVersion,
        /// Version reported by the bridge
        found: FirmwareVersion,
    },

    /// The bridge firmware cannot identify the selected chip
    #[error("NAND{chip_select} identify not supported by this bridge (got 0x{response:02X})")]
    IdentifyUnsupported {
        /// Chip select line that was queried
        chip_select: u8,
        /// Capability byte returned instead of 'Y'
        response: u8,
    },

    /// The identification payload describes an unusable chip
    #[error("Invalid chip geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// A page or block command returned a non-OK status byte
    #[error("{op} of page 0x{page:X} failed: {result}")]
    Command {
        /// The command that failed
        op: Operation,
        /// Page address sent with the command
        page: u32,
        /// Interpreted status byte
        result: CommandResult,
    },

    /// Read-back after programming differs from the source data
    #[error("Block verification failed: block=0x{block:X} page=0x{page:X}")]
    VerifyMismatch {
        /// Block being verified
        block: u32,
        /// First page whose contents differ
        page: u32,
    },

    // Input errors
    /// A page or block buffer has the wrong size
    #[error("Incorrect data length {found} (expected {expected})")]
    LengthMismatch {
        /// Required length in bytes
        expected: usize,
        /// Provided length in bytes
        found: usize,
    },

    /// A program image is not made of whole blocks
    #[error("Image size 0x{len:X} is not a multiple of the block+spare size 0x{block_size:X}")]
    ImageNotBlockAligned {
        /// Image length in bytes
        len: usize,
        /// Block size including spare area
        block_size: u32,
    },

    /// The requested block range runs past the end of the source image
    #[error("Blocks 0x{offset:X}..0x{end:X} exceed the image, which holds 0x{available:X} blocks")]
    RangeExceedsImage {
        /// First requested block
        offset: u64,
        /// One past the last requested block
        end: u64,
        /// Blocks present in the image
        available: u64,
    },

    /// The requested block range runs past the end of the chip
    #[error("Blocks 0x{offset:X}..0x{end:X} exceed the NAND capacity of 0x{available:X} blocks")]
    RangeExceedsDevice {
        /// First requested block
        offset: u64,
        /// One past the last requested block
        end: u64,
        /// Blocks present on the chip
        available: u32,
    },

    /// A diff entry does not point at the start of a block
    #[error("Incorrect address for block addr=0x{address:X}: addresses must be on a block boundary (0x{block_size:X})")]
    MisalignedAddress {
        /// Byte address from the diff file
        address: u64,
        /// Block size including spare area
        block_size: u32,
    },

    /// A diff file line is not of the form `0x<hex>`
    #[error("Diff file line {line}: cannot parse {text:?}")]
    InvalidDiffLine {
        /// 1-based line number
        line: usize,
        /// Offending line contents
        text: String,
    },
}

impl Error {
    /// Classify this error
    pub fn severity(&self) -> Severity {
        match self {
            Error::ConnectionFailed(_) | Error::Timeout | Error::IoError(_) | Error::SessionClosed => {
                Severity::Transport
            }
            Error::FirmwareMismatch { .. }
            | Error::IdentifyUnsupported { .. }
            | Error::InvalidGeometry(_) => Severity::Protocol,
            Error::Command { result, .. } if result.is_fatal() => Severity::Protocol,
            Error::Command { .. } | Error::VerifyMismatch { .. } => Severity::Recoverable,
            Error::LengthMismatch { .. }
            | Error::ImageNotBlockAligned { .. }
            | Error::RangeExceedsImage { .. }
            | Error::RangeExceedsDevice { .. }
            | Error::MisalignedAddress { .. }
            | Error::InvalidDiffLine { .. } => Severity::Input,
        }
    }

    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        self.severity().is_fatal()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::IoError(e.to_string()),
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_severity() {
        let recoverable = Error::Command {
            op: Operation::WritePage,
            page: 0x40,
            result: CommandResult::WriteProtected,
        };
        assert_eq!(recoverable.severity(), Severity::Recoverable);
        assert!(!recoverable.is_fatal());

        let fatal = Error::Command {
            op: Operation::ReadPage,
            page: 0,
            result: CommandResult::ReceiveBufferTimeout,
        };
        assert_eq!(fatal.severity(), Severity::Protocol);
        assert!(fatal.is_fatal());

        let unknown = Error::Command {
            op: Operation::EraseBlock,
            page: 0,
            result: CommandResult::Unknown(0x00),
        };
        assert!(unknown.is_fatal());
    }

    #[test]
    fn test_input_errors_are_not_fatal() {
        let err = Error::MisalignedAddress {
            address: 0x1234,
            block_size: 0x21000,
        };
        assert_eq!(err.severity(), Severity::Input);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, Error::Timeout));
        assert!(err.is_fatal());

        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
