//! Transport layer for bridge communication
//!
//! [`Transport`] is the raw byte channel. [`BufferedLink`] sits on top of it
//! and coalesces small writes into large transfers; any read first pushes
//! out everything still queued, so a reply is never awaited for a command
//! the bridge has not received.

use nandway_core::{Error, Result};

/// Output buffer capacity of a [`BufferedLink`]
pub const OUTPUT_BUFFER_SIZE: usize = 32768;

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Write bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read bytes from the transport
    ///
    /// Reads exactly `buf.len()` bytes into the buffer.
    /// Returns an error if not enough bytes arrive before the timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()>;
}

/// Write-coalescing wrapper around a [`Transport`]
///
/// Once closed, every operation fails with [`Error::SessionClosed`].
pub struct BufferedLink<T: Transport> {
    transport: Option<T>,
    pending: Vec<u8>,
    capacity: usize,
}

impl<T: Transport> BufferedLink<T> {
    /// Wrap a transport with the default buffer capacity
    pub fn new(transport: T) -> Self {
        Self::with_capacity(transport, OUTPUT_BUFFER_SIZE)
    }

    /// Wrap a transport with a custom buffer capacity
    pub fn with_capacity(transport: T, capacity: usize) -> Self {
        Self {
            transport: Some(transport),
            pending: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Queue bytes for sending
    ///
    /// Whenever more than `capacity` bytes are queued, full chunks are
    /// written out oldest first.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::SessionClosed)?;

        self.pending.extend_from_slice(data);
        while self.pending.len() > self.capacity {
            transport.write(&self.pending[..self.capacity])?;
            self.pending.drain(..self.capacity);
        }
        Ok(())
    }

    /// Send everything queued
    pub fn flush(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::SessionClosed)?;

        if !self.pending.is_empty() {
            log::trace!("Flushing {} bytes", self.pending.len());
            transport.write(&self.pending)?;
            self.pending.clear();
        }
        transport.flush()
    }

    /// Flush, then read exactly `buf.len()` bytes
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.flush()?;
        match self.transport.as_mut() {
            Some(transport) => transport.read(buf),
            None => Err(Error::SessionClosed),
        }
    }

    /// Flush, then read a single byte
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    /// Number of bytes queued but not yet sent
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Underlying transport, if the link is open
    pub fn get_ref(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Whether the link can still be used
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Release the transport, discarding unsent bytes
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            if !self.pending.is_empty() {
                log::debug!("Discarding {} unsent bytes", self.pending.len());
            }
            log::debug!("Link closed");
        }
        self.pending.clear();
    }
}

#[cfg(feature = "serial")]
pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use crate::protocol::{DEFAULT_BAUD, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};
    use std::time::Duration;

    /// Serial port settings
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SerialConfig {
        /// Device path (e.g., "/dev/ttyACM0" or "COM3")
        pub device: String,
        /// Baud rate
        pub baud: u32,
        /// Timeout for reads
        pub read_timeout: Duration,
        /// Timeout for writes
        pub write_timeout: Duration,
    }

    impl SerialConfig {
        /// Default settings for the given device
        pub fn new(device: impl Into<String>) -> Self {
            Self {
                device: device.into(),
                baud: DEFAULT_BAUD,
                read_timeout: DEFAULT_READ_TIMEOUT,
                write_timeout: DEFAULT_WRITE_TIMEOUT,
            }
        }
    }

    fn port_error(e: serialport::Error) -> Error {
        match e.kind() {
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => Error::Timeout,
            _ => Error::IoError(e.to_string()),
        }
    }

    /// Serial port transport
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
        read_timeout: Duration,
        write_timeout: Duration,
    }

    impl SerialTransport {
        /// Open a serial port and discard anything left in its buffers
        pub fn open(config: &SerialConfig) -> Result<Self> {
            let port = serialport::new(&config.device, config.baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(config.read_timeout)
                .open()
                .map_err(|e| {
                    Error::ConnectionFailed(format!("{}: {}", config.device, e))
                })?;

            port.clear(ClearBuffer::All).map_err(port_error)?;

            log::info!("Opened serial port {} at {} baud", config.device, config.baud);

            Ok(Self {
                port,
                read_timeout: config.read_timeout,
                write_timeout: config.write_timeout,
            })
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            // Writes use their own timeout
            self.port
                .set_timeout(self.write_timeout)
                .map_err(port_error)?;
            let result = self.port.write_all(data);
            self.port
                .set_timeout(self.read_timeout)
                .map_err(port_error)?;
            result?;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.port.read_exact(buf)?;
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.port.flush()?;
            Ok(())
        }
    }
}
