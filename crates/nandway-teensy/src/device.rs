//! NANDway bridge device implementation
//!
//! A connection goes through two states. [`Bridge`] is a link whose firmware
//! answered the ping handshake with the expected version; it can identify a
//! chip or reboot the bridge into its bootloader. [`Session`] is the result
//! of a successful identify: it owns the chip geometry for its whole
//! lifetime and implements [`NandDevice`].
//!
//! Any fatal error (transport failure, receive-buffer timeout, unknown status
//! byte) closes the link. Later calls then fail with `SessionClosed`.

use nandway_core::flash::{check_page_len, NandDevice};
use nandway_core::geometry::ID_PAYLOAD_LEN;
use nandway_core::{ChipGeometry, CommandResult, Error, FirmwareInfo, FirmwareVersion, Operation, Result};

use crate::protocol::*;
use crate::transport::{BufferedLink, Transport};

/// Per-connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Chip to talk to
    pub chip_select: ChipSelect,
    /// Enable the bridge pull-up resistors before identifying
    pub pullups: bool,
    /// Firmware version the bridge must report
    pub firmware: FirmwareVersion,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chip_select: ChipSelect::Nand0,
            pullups: true,
            firmware: DEFAULT_FIRMWARE,
        }
    }
}

/// Run the ping handshake and check the firmware version
fn handshake<T: Transport>(
    link: &mut BufferedLink<T>,
    expected: FirmwareVersion,
) -> Result<FirmwareInfo> {
    link.write(&[CMD_PING1, CMD_PING2])?;
    let mut reply = [0u8; PING_REPLY_LEN];
    link.read(&mut reply)?;

    let info = decode_ping(&reply);
    log::debug!("Ping reply: {:02X?}", reply);
    if info.version != expected {
        return Err(Error::FirmwareMismatch {
            expected,
            found: info.version,
        });
    }
    Ok(info)
}

/// Close the link if `result` carries a fatal error
fn close_on_fatal<T: Transport, R>(link: &mut BufferedLink<T>, result: Result<R>) -> Result<R> {
    if let Err(e) = &result {
        if e.is_fatal() && link.is_open() {
            log::error!("{}; closing connection", e);
            link.close();
        }
    }
    result
}

/// Connected bridge with verified firmware
pub struct Bridge<T: Transport> {
    link: BufferedLink<T>,
    config: SessionConfig,
    firmware: FirmwareInfo,
}

impl<T: Transport> Bridge<T> {
    /// Ping the bridge over `transport`
    ///
    /// Fails with `FirmwareMismatch` if the bridge reports any version other
    /// than `config.firmware`. The transport is released on failure.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self> {
        let mut link = BufferedLink::new(transport);
        let result = handshake(&mut link, config.firmware);
        let firmware = close_on_fatal(&mut link, result)?;

        log::info!("NANDway {}", firmware);

        Ok(Self {
            link,
            config,
            firmware,
        })
    }

    /// Reply to the opening ping
    pub fn firmware(&self) -> &FirmwareInfo {
        &self.firmware
    }

    /// Settings this bridge was opened with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Repeat the ping handshake
    pub fn ping(&mut self) -> Result<FirmwareInfo> {
        let result = handshake(&mut self.link, self.config.firmware);
        close_on_fatal(&mut self.link, result)
    }

    /// Identify the selected chip and start a session
    ///
    /// Sets the pull-up state, sends the identify command and decodes the
    /// returned geometry. Every failure here is fatal, so the bridge is
    /// consumed either way.
    pub fn identify(mut self) -> Result<Session<T>> {
        let pullups = if self.config.pullups {
            CMD_PULLUPS_ENABLE
        } else {
            CMD_PULLUPS_DISABLE
        };
        let chip_select = self.config.chip_select;
        self.link.write(&[pullups, chip_select.opcodes().identify])?;

        let supported = self.link.read_byte()?;
        if supported != IDENTIFY_SUPPORTED {
            return Err(Error::IdentifyUnsupported {
                chip_select: chip_select.index(),
                response: supported,
            });
        }

        let mut payload = [0u8; ID_PAYLOAD_LEN];
        self.link.read(&mut payload)?;
        log::debug!("Raw ID data: {:02X?}", &payload[..5]);

        let geometry = ChipGeometry::from_id_payload(&payload)?;
        log::info!(
            "NAND{}: {:02X}:{:02X}, {} blocks of {} bytes",
            chip_select.index(),
            geometry.manufacturer_id(),
            geometry.device_id(),
            geometry.block_count(),
            geometry.block_size_with_spare()
        );

        Ok(Session {
            link: self.link,
            config: self.config,
            firmware: self.firmware,
            geometry,
        })
    }

    /// Reboot the bridge into its bootloader
    ///
    /// The bridge drops off the bus, so the link is closed afterwards.
    pub fn enter_bootloader(mut self) -> Result<()> {
        self.link.write(&[CMD_BOOTLOADER])?;
        self.link.flush()?;
        log::info!("Bridge rebooting into bootloader");
        self.link.close();
        Ok(())
    }

    /// Release the transport
    pub fn close(mut self) {
        self.link.close();
    }
}

/// Identified chip on a bridge
pub struct Session<T: Transport> {
    link: BufferedLink<T>,
    config: SessionConfig,
    firmware: FirmwareInfo,
    geometry: ChipGeometry,
}

impl<T: Transport> Session<T> {
    /// Reply to the opening ping
    pub fn firmware(&self) -> &FirmwareInfo {
        &self.firmware
    }

    /// Chip this session talks to
    pub fn chip_select(&self) -> ChipSelect {
        self.config.chip_select
    }

    /// Whether the link is still usable
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Repeat the ping handshake
    pub fn ping(&mut self) -> Result<FirmwareInfo> {
        let result = handshake(&mut self.link, self.config.firmware);
        close_on_fatal(&mut self.link, result)
    }

    /// Release the transport
    pub fn close(mut self) {
        self.link.close();
    }

    fn check_page(&self, page: u32) -> Result<()> {
        let count = self.geometry.page_count();
        if page >= count {
            let block = u64::from(self.geometry.block_of_page(page));
            return Err(Error::RangeExceedsDevice {
                offset: block,
                end: block + 1,
                available: self.geometry.block_count(),
            });
        }
        Ok(())
    }

    /// Read the status byte that ends a page command
    fn status(&mut self, op: Operation, page: u32) -> Result<()> {
        let status = self.link.read_byte()?;
        let result = CommandResult::from_status(status);
        if result != CommandResult::Ok {
            log::debug!("{} 0x{:X}: status 0x{:02X}", op, page, status);
        }
        result.into_result(op, page)
    }

    fn do_read(&mut self, page: u32, buf: &mut [u8]) -> Result<()> {
        let opcode = self.config.chip_select.opcodes().read_page;
        self.link.write(&encode_page_command(opcode, page))?;
        self.status(Operation::ReadPage, page)?;
        self.link.read(buf)
    }

    fn do_write(&mut self, page: u32, data: &[u8]) -> Result<()> {
        let opcode = self.config.chip_select.opcodes().write_page;
        self.link.write(&encode_page_command(opcode, page))?;
        self.link.write(data)?;
        self.status(Operation::WritePage, page)
    }

    fn do_erase(&mut self, page: u32) -> Result<()> {
        let opcode = self.config.chip_select.opcodes().erase_block;
        self.link.write(&encode_page_command(opcode, page))?;
        self.status(Operation::EraseBlock, page)
    }
}

impl<T: Transport> NandDevice for Session<T> {
    fn geometry(&self) -> &ChipGeometry {
        &self.geometry
    }

    fn read_page(&mut self, page: u32, buf: &mut [u8]) -> Result<()> {
        check_page_len(&self.geometry, buf.len())?;
        self.check_page(page)?;
        let result = self.do_read(page, buf);
        close_on_fatal(&mut self.link, result)
    }

    fn write_page(&mut self, page: u32, data: &[u8]) -> Result<()> {
        check_page_len(&self.geometry, data.len())?;
        self.check_page(page)?;
        let result = self.do_write(page, data);
        close_on_fatal(&mut self.link, result)
    }

    fn erase_block(&mut self, page: u32) -> Result<()> {
        self.check_page(page)?;
        let result = self.do_erase(page);
        close_on_fatal(&mut self.link, result)
    }
}
