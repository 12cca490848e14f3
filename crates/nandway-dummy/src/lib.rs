//! nandway-dummy - Emulated NANDway bridge for testing
//!
//! [`DummyBridge`] implements the bridge side of the serial protocol on top
//! of in-memory NAND arrays and plugs into the host driver as a
//! [`Transport`]. It decodes the byte stream exactly as the firmware would,
//! so the whole stack (buffered link, session, bulk operations) can be
//! exercised without hardware.
//!
//! The emulator is a cheap handle around shared state: clone it before
//! handing it to [`nandway_teensy::Bridge::new`] and keep the clone to
//! inspect memory and the command log afterwards.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use nandway_core::{ChipGeometry, CommandResult, Error, FirmwareVersion, Operation, RawGeometry, Result};
use nandway_teensy::protocol::*;
use nandway_teensy::Transport;

/// Configuration for the emulated bridge
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Firmware version reported by ping
    pub firmware: FirmwareVersion,
    /// Free memory reported by ping
    pub free_memory: u16,
    /// Chip on NAND0, as its identify fields
    pub nand0: Option<RawGeometry>,
    /// Chip on NAND1
    pub nand1: Option<RawGeometry>,
}

/// Small Samsung-like part: 4 pages of 256+8 bytes per block, 16 blocks
pub fn small_chip() -> RawGeometry {
    RawGeometry {
        manufacturer_id: 0xEC,
        device_id: 0xF1,
        page_size: 256,
        spare_size: 8,
        bus_width: 8,
        block_size: 1024,
        block_count: 16,
        plane_count: 1,
        plane_size: 16 * 1024,
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            firmware: DEFAULT_FIRMWARE,
            free_memory: 4000,
            nand0: Some(small_chip()),
            nand1: None,
        }
    }
}

/// Command decoded by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ping handshake
    Ping,
    /// Reboot into bootloader
    Bootloader,
    /// I/O lock
    IoLock,
    /// I/O release
    IoRelease,
    /// Pull-ups enabled (true) or disabled (false)
    Pullups(bool),
    /// Identify
    Identify(ChipSelect),
    /// Page or block command
    Page(ChipSelect, Operation, u32),
    /// Unrecognised opcode
    Unknown(u8),
}

struct Chip {
    raw: RawGeometry,
    page_len: usize,
    pages_per_block: u32,
    memory: Vec<u8>,
}

impl Chip {
    fn new(raw: RawGeometry) -> Self {
        // Memory follows the corrected geometry the host will compute
        match ChipGeometry::from_raw(raw) {
            Ok(geo) => Self {
                raw,
                page_len: geo.page_size_with_spare() as usize,
                pages_per_block: geo.pages_per_block(),
                memory: vec![0xFF; geo.total_size_with_spare() as usize],
            },
            Err(e) => {
                log::debug!("dummy: chip has unusable geometry ({})", e);
                Self {
                    raw,
                    page_len: 0,
                    pages_per_block: 1,
                    memory: Vec::new(),
                }
            }
        }
    }

    fn page_range(&self, page: u32) -> Option<std::ops::Range<usize>> {
        let start = page as usize * self.page_len;
        let end = start + self.page_len;
        (self.page_len > 0 && end <= self.memory.len()).then_some(start..end)
    }
}

struct State {
    config: DummyConfig,
    chips: [Option<Chip>; 2],
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    ping_armed: bool,
    in_bootloader: bool,
    write_protected: bool,
    injected: Vec<(Operation, u32, u8)>,
    commands: Vec<Command>,
    transfers: Vec<usize>,
}

/// Emulated NANDway bridge
#[derive(Clone)]
pub struct DummyBridge {
    state: Rc<RefCell<State>>,
}

impl DummyBridge {
    /// Create a bridge with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let chips = [config.nand0.map(Chip::new), config.nand1.map(Chip::new)];
        Self {
            state: Rc::new(RefCell::new(State {
                config,
                chips,
                rx: Vec::new(),
                tx: VecDeque::new(),
                ping_armed: false,
                in_bootloader: false,
                write_protected: false,
                injected: Vec::new(),
                commands: Vec::new(),
                transfers: Vec::new(),
            })),
        }
    }

    /// Create a bridge with a small chip on NAND0
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Contents (data + spare) of the chip on `cs`
    pub fn memory(&self, cs: ChipSelect) -> Vec<u8> {
        let state = self.state.borrow();
        state.chips[cs.index() as usize]
            .as_ref()
            .map(|chip| chip.memory.clone())
            .unwrap_or_default()
    }

    /// Overwrite chip memory starting at byte `offset`
    pub fn load(&self, cs: ChipSelect, offset: usize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(chip) = state.chips[cs.index() as usize].as_mut() {
            chip.memory[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    /// Make every write and erase fail with a write-protect status
    pub fn set_write_protected(&self, protected: bool) {
        self.state.borrow_mut().write_protected = protected;
    }

    /// Answer the next `op` on `page` with `status` instead of executing it
    pub fn inject_status(&self, op: Operation, page: u32, status: u8) {
        self.state.borrow_mut().injected.push((op, page, status));
    }

    /// Commands decoded so far
    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    /// Sizes of the writes received from the host
    pub fn transfers(&self) -> Vec<usize> {
        self.state.borrow().transfers.clone()
    }

    /// Whether the bootloader command was received
    pub fn in_bootloader(&self) -> bool {
        self.state.borrow().in_bootloader
    }
}

impl State {
    fn chip(&mut self, cs: ChipSelect) -> Option<&mut Chip> {
        self.chips[cs.index() as usize].as_mut()
    }

    fn take_injected(&mut self, op: Operation, page: u32) -> Option<u8> {
        let pos = self
            .injected
            .iter()
            .position(|&(o, p, _)| o == op && p == page)?;
        Some(self.injected.remove(pos).2)
    }

    /// Decode as many complete commands from `rx` as possible
    fn process(&mut self) {
        loop {
            let Some(&opcode) = self.rx.first() else {
                return;
            };
            let consumed = match self.execute(opcode) {
                Some(n) => n,
                None => return,
            };
            self.rx.drain(..consumed);
        }
    }

    /// Execute the command at the head of `rx`
    ///
    /// Returns the bytes consumed, or `None` if the command is incomplete.
    fn execute(&mut self, opcode: u8) -> Option<usize> {
        if opcode != CMD_PING2 {
            self.ping_armed = false;
        }

        let cs = match opcode {
            CMD_NAND0_ID..=CMD_NAND0_ERASEBLOCK => ChipSelect::Nand0,
            _ => ChipSelect::Nand1,
        };

        match opcode {
            CMD_PING1 => {
                self.ping_armed = true;
                Some(1)
            }
            CMD_PING2 => {
                if self.ping_armed {
                    self.ping_armed = false;
                    self.commands.push(Command::Ping);
                    let v = self.config.firmware;
                    self.tx.extend([v.major, v.minor]);
                    self.tx.extend(self.config.free_memory.to_be_bytes());
                }
                Some(1)
            }
            CMD_BOOTLOADER => {
                self.commands.push(Command::Bootloader);
                self.in_bootloader = true;
                Some(1)
            }
            CMD_IO_LOCK => {
                self.commands.push(Command::IoLock);
                Some(1)
            }
            CMD_IO_RELEASE => {
                self.commands.push(Command::IoRelease);
                Some(1)
            }
            CMD_PULLUPS_DISABLE | CMD_PULLUPS_ENABLE => {
                self.commands
                    .push(Command::Pullups(opcode == CMD_PULLUPS_ENABLE));
                Some(1)
            }
            CMD_NAND0_ID | CMD_NAND1_ID => {
                self.commands.push(Command::Identify(cs));
                match self.chip(cs).map(|chip| chip.raw.encode()) {
                    Some(payload) => {
                        self.tx.push_back(IDENTIFY_SUPPORTED);
                        self.tx.extend(payload);
                    }
                    None => self.tx.push_back(b'N'),
                }
                Some(1)
            }
            CMD_NAND0_READPAGE | CMD_NAND1_READPAGE => {
                let page = self.address()?;
                self.commands
                    .push(Command::Page(cs, Operation::ReadPage, page));
                self.read_page(cs, page);
                Some(1 + PAGE_ADDRESS_LEN)
            }
            CMD_NAND0_WRITEPAGE | CMD_NAND1_WRITEPAGE => {
                let page = self.address()?;
                let page_len = self.chip(cs).map_or(0, |chip| chip.page_len);
                let total = 1 + PAGE_ADDRESS_LEN + page_len;
                if self.rx.len() < total {
                    return None;
                }
                self.commands
                    .push(Command::Page(cs, Operation::WritePage, page));
                let data = self.rx[1 + PAGE_ADDRESS_LEN..total].to_vec();
                self.write_page(cs, page, &data);
                Some(total)
            }
            CMD_NAND0_ERASEBLOCK | CMD_NAND1_ERASEBLOCK => {
                let page = self.address()?;
                self.commands
                    .push(Command::Page(cs, Operation::EraseBlock, page));
                self.erase_block(cs, page);
                Some(1 + PAGE_ADDRESS_LEN)
            }
            _ => {
                log::debug!("dummy: unknown opcode 0x{:02X}", opcode);
                self.commands.push(Command::Unknown(opcode));
                Some(1)
            }
        }
    }

    fn address(&self) -> Option<u32> {
        let bytes = self.rx.get(1..1 + PAGE_ADDRESS_LEN)?;
        Some(decode_page_address(&[bytes[0], bytes[1], bytes[2]]))
    }

    fn read_page(&mut self, cs: ChipSelect, page: u32) {
        if let Some(status) = self.take_injected(Operation::ReadPage, page) {
            self.tx.push_back(status);
            return;
        }

        let data = self
            .chip(cs)
            .and_then(|chip| chip.page_range(page).map(|r| chip.memory[r].to_vec()));
        match data {
            Some(data) => {
                self.tx.push_back(CommandResult::Ok.status_byte());
                self.tx.extend(data);
            }
            None => self.tx.push_back(b'?'),
        }
    }

    fn write_page(&mut self, cs: ChipSelect, page: u32, data: &[u8]) {
        let status = if let Some(status) = self.take_injected(Operation::WritePage, page) {
            status
        } else if self.write_protected {
            CommandResult::WriteProtected.status_byte()
        } else {
            match self.chip(cs) {
                Some(chip) => match chip.page_range(page) {
                    Some(range) => {
                        // Programming can only clear bits
                        for (cell, byte) in chip.memory[range].iter_mut().zip(data) {
                            *cell &= byte;
                        }
                        CommandResult::Ok.status_byte()
                    }
                    None => b'?',
                },
                None => b'?',
            }
        };
        self.tx.push_back(status);
    }

    fn erase_block(&mut self, cs: ChipSelect, page: u32) {
        let status = if let Some(status) = self.take_injected(Operation::EraseBlock, page) {
            status
        } else if self.write_protected {
            CommandResult::WriteProtected.status_byte()
        } else {
            match self.chip(cs) {
                Some(chip) => {
                    let first = page - page % chip.pages_per_block;
                    let start = chip.page_range(first);
                    let end = chip.page_range(first + chip.pages_per_block - 1);
                    match (start, end) {
                        (Some(start), Some(end)) => {
                            chip.memory[start.start..end.end].fill(0xFF);
                            CommandResult::Ok.status_byte()
                        }
                        _ => b'?',
                    }
                }
                None => b'?',
            }
        };
        self.tx.push_back(status);
    }
}

impl Transport for DummyBridge {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.in_bootloader {
            return Err(Error::IoError("device disconnected".into()));
        }
        state.transfers.push(data.len());
        state.rx.extend_from_slice(data);
        state.process();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let n = buf.len();
        if state.tx.len() < n {
            // The real bridge would just stay silent
            state.tx.clear();
            return Err(Error::Timeout);
        }
        for (dst, src) in buf.iter_mut().zip(state.tx.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nandway_core::flash::{self, parse_diff, FailurePolicy, NandDevice, NoProgress, ProgramOptions};
    use nandway_core::GeometryError;
    use nandway_teensy::{Bridge, Session, SessionConfig};

    // small_chip(): 4 pages of 264 bytes per block, 16 blocks
    const PAGE_LEN: usize = 264;
    const BLOCK_LEN: usize = 4 * PAGE_LEN;
    const CHIP_LEN: usize = 16 * BLOCK_LEN;

    fn image() -> Vec<u8> {
        (0..CHIP_LEN).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn open(dummy: &DummyBridge) -> Session<DummyBridge> {
        Bridge::new(dummy.clone(), SessionConfig::default())
            .unwrap()
            .identify()
            .unwrap()
    }

    fn erased_blocks(dummy: &DummyBridge) -> Vec<u32> {
        dummy
            .commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                Command::Page(_, Operation::EraseBlock, page) => Some(page / 4),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_identify_geometry() {
        let dummy = DummyBridge::new_default();
        let session = open(&dummy);
        let geo = session.geometry();
        assert_eq!(geo.page_size_with_spare() as usize, PAGE_LEN);
        assert_eq!(geo.block_size_with_spare() as usize, BLOCK_LEN);
        assert_eq!(geo.total_size_with_spare() as usize, CHIP_LEN);
        assert_eq!(session.firmware().free_memory, 4000);
        assert_eq!(
            dummy.commands(),
            vec![
                Command::Ping,
                Command::Pullups(true),
                Command::Identify(ChipSelect::Nand0)
            ]
        );
    }

    #[test]
    fn test_program_then_dump_round_trip() {
        let dummy = DummyBridge::new_default();
        let mut session = open(&dummy);
        let image = image();

        let report = flash::program(
            &mut session,
            &image,
            ProgramOptions::verified(true),
            0,
            0,
            &mut NoProgress,
        )
        .unwrap();
        assert!(report.is_success());
        assert_eq!(report.blocks_programmed, 16);
        assert_eq!(dummy.memory(ChipSelect::Nand0), image);

        let mut out = Vec::new();
        let written = flash::dump(&mut session, &mut out, 0, 0, &mut NoProgress).unwrap();
        assert_eq!(written as usize, CHIP_LEN);
        assert_eq!(out, image);

        session.ping().unwrap();
    }

    #[test]
    fn test_dump_partial_range() {
        let dummy = DummyBridge::new_default();
        let image = image();
        dummy.load(ChipSelect::Nand0, 0, &image);
        let mut session = open(&dummy);

        let mut out = Vec::new();
        flash::dump(&mut session, &mut out, 2, 3, &mut NoProgress).unwrap();
        assert_eq!(out, &image[2 * BLOCK_LEN..5 * BLOCK_LEN]);

        // Past the end is rejected before any read
        let before = dummy.commands().len();
        let err = flash::dump(&mut session, &mut out, 16, 1, &mut NoProgress).unwrap_err();
        assert!(matches!(err, Error::RangeExceedsDevice { .. }));
        assert_eq!(dummy.commands().len(), before);
    }

    #[test]
    fn test_program_without_erase_would_fail_verify() {
        // A write that the chip silently drops leaves erased cells behind
        let dummy = DummyBridge::new_default();
        dummy.inject_status(Operation::WritePage, 5, b'K');
        let mut session = open(&dummy);

        let report = flash::program(
            &mut session,
            &image(),
            ProgramOptions::verified(true),
            0,
            0,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(report.blocks_programmed, 15);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].block, 1);
        assert!(matches!(
            report.failures[0].error,
            Error::VerifyMismatch { block: 1, page: 5 }
        ));
        assert!(session.is_open());
    }

    #[test]
    fn test_write_protected_chip() {
        let dummy = DummyBridge::new_default();
        dummy.set_write_protected(true);
        let mut session = open(&dummy);
        let image = image();

        let report = flash::program(
            &mut session,
            &image,
            ProgramOptions::default(),
            0,
            4,
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(report.failures.len(), 4);
        assert!(!report.aborted);
        assert!(report.failures.iter().all(|f| matches!(
            f.error,
            Error::Command {
                result: CommandResult::WriteProtected,
                ..
            }
        )));

        let options = ProgramOptions {
            verify: false,
            on_failure: FailurePolicy::Abort,
        };
        let report = flash::program(&mut session, &image, options, 0, 4, &mut NoProgress).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.aborted);
        assert!(session.is_open());
    }

    #[test]
    fn test_fatal_status_stops_program() {
        let dummy = DummyBridge::new_default();
        dummy.inject_status(Operation::EraseBlock, 8, b'R');
        let mut session = open(&dummy);

        let err = flash::program(
            &mut session,
            &image(),
            ProgramOptions::default(),
            0,
            0,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Command {
                op: Operation::EraseBlock,
                page: 8,
                result: CommandResult::ReceiveBufferTimeout
            }
        ));
        assert!(!session.is_open());
        assert_eq!(erased_blocks(&dummy), vec![0, 1, 2]);

        // Blocks after the failure were never touched
        let memory = dummy.memory(ChipSelect::Nand0);
        assert!(memory[3 * BLOCK_LEN..].iter().all(|&b| b == 0xFF));
        assert!(matches!(session.ping(), Err(Error::SessionClosed)));
    }

    #[test]
    fn test_diff_program() {
        let dummy = DummyBridge::new_default();
        let mut session = open(&dummy);
        let image = image();

        // block 1, a misaligned entry, block 3
        let entries = parse_diff("0x420\n0x421\n0xC60\n").unwrap();
        let report = flash::diff_program(
            &mut session,
            &image,
            &entries,
            ProgramOptions::verified(true),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcomes[1].result,
            Err(Error::MisalignedAddress { address: 0x421, .. })
        ));
        assert_eq!(erased_blocks(&dummy), vec![1, 3]);

        let memory = dummy.memory(ChipSelect::Nand0);
        assert_eq!(&memory[BLOCK_LEN..2 * BLOCK_LEN], &image[BLOCK_LEN..2 * BLOCK_LEN]);
        assert!(memory[..BLOCK_LEN].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_firmware_mismatch() {
        let dummy = DummyBridge::new(DummyConfig {
            firmware: FirmwareVersion::new(0, 64),
            ..DummyConfig::default()
        });
        let err = Bridge::new(dummy.clone(), SessionConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::FirmwareMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_second_chip_select() {
        let dummy = DummyBridge::new_default();
        let config = SessionConfig {
            chip_select: ChipSelect::Nand1,
            ..SessionConfig::default()
        };
        let err = Bridge::new(dummy.clone(), config)
            .unwrap()
            .identify()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::IdentifyUnsupported {
                chip_select: 1,
                response: b'N'
            }
        ));

        let dummy = DummyBridge::new(DummyConfig {
            nand1: Some(small_chip()),
            ..DummyConfig::default()
        });
        let mut session = Bridge::new(dummy.clone(), config)
            .unwrap()
            .identify()
            .unwrap();
        let page = vec![0u8; PAGE_LEN];
        session.erase_block(4).unwrap();
        session.write_page(4, &page).unwrap();

        assert!(dummy.memory(ChipSelect::Nand0).iter().all(|&b| b == 0xFF));
        assert_eq!(&dummy.memory(ChipSelect::Nand1)[BLOCK_LEN..BLOCK_LEN + PAGE_LEN], &page[..]);
        assert!(dummy
            .commands()
            .contains(&Command::Page(ChipSelect::Nand1, Operation::WritePage, 4)));
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let mut chip = small_chip();
        chip.page_size = 0;
        let dummy = DummyBridge::new(DummyConfig {
            nand0: Some(chip),
            ..DummyConfig::default()
        });
        let err = Bridge::new(dummy, SessionConfig::default())
            .unwrap()
            .identify()
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidGeometry(GeometryError::ZeroPageSize)));
    }

    #[test]
    fn test_pullups_disabled() {
        let dummy = DummyBridge::new_default();
        let config = SessionConfig {
            pullups: false,
            ..SessionConfig::default()
        };
        Bridge::new(dummy.clone(), config).unwrap().identify().unwrap();
        assert!(dummy.commands().contains(&Command::Pullups(false)));
    }

    #[test]
    fn test_bootloader() {
        let dummy = DummyBridge::new_default();
        let bridge = Bridge::new(dummy.clone(), SessionConfig::default()).unwrap();
        bridge.enter_bootloader().unwrap();
        assert!(dummy.in_bootloader());
        assert_eq!(dummy.commands().last(), Some(&Command::Bootloader));
    }

    #[test]
    fn test_large_writes_are_chunked() {
        let dummy = DummyBridge::new_default();
        let mut session = open(&dummy);
        let geo = session.geometry().clone();

        // Queue 200 page writes without reading a status in between
        let page = vec![0u8; geo.page_size_with_spare() as usize];
        let mut link = nandway_teensy::BufferedLink::new(dummy.clone());
        for p in 0..200u32 {
            link.write(&encode_page_command(CMD_NAND0_WRITEPAGE, p % 64)).unwrap();
            link.write(&page).unwrap();
        }
        let sizes = dummy.transfers();
        assert!(sizes.iter().skip(2).all(|&n| n == nandway_teensy::transport::OUTPUT_BUFFER_SIZE));
        assert!(link.pending() <= nandway_teensy::transport::OUTPUT_BUFFER_SIZE);

        // Every queued write is answered once the tail goes out
        link.flush().unwrap();
        let mut status = vec![0u8; 200];
        link.read(&mut status).unwrap();
        assert!(status.iter().all(|&s| s == b'K'));
        session.ping().unwrap();
    }
}
