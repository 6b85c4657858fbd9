//! Device connections
//!
//! A connection descriptor string selects one of three transports:
//! - `-` : passthrough, write to stdout and read responses from stdin
//! - `<path>[,b<baud>][,[+|-]crtscts]` : serial device
//! - `<host>[:<port>]` : TCP socket (default port 8888)
//!
//! Whatever the transport, a [`Connection`] offers the same three
//! operations: write a batch of blocks, discard pending input, and read
//! response lines.

pub mod line_reader;
pub mod serial;
#[cfg(unix)]
pub mod stdio;
pub mod tcp;

use gcodestream_core::{ConfigError, Result};
use line_reader::LineReader;
use serial::SerialParams;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;
use tcp::TcpConnectionInfo;

/// Descriptor selecting the stdin/stdout passthrough
pub const PASSTHROUGH_DESCRIPTOR: &str = "-";

/// Arena size of the response reader
pub const RESPONSE_BUFFER_SIZE: usize = 1 << 16;

const DISCARD_CHUNK_SIZE: usize = 128;

/// Inbound side of a transport
pub trait InboundChannel: Read + Send {
    /// Bound how long a read may wait for data.
    ///
    /// `None` blocks until data or end-of-stream. With a timeout, a read that
    /// finds nothing fails with `TimedOut` or `WouldBlock`.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

/// Transport variant behind a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Serial/USB tty
    Serial,
    /// TCP socket
    Network,
    /// stdin/stdout passthrough
    Stdio,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Network => write!(f, "tcp"),
            Self::Stdio => write!(f, "stdio"),
        }
    }
}

/// A resolved connection descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// stdin/stdout
    Stdio,
    /// Existing device path with its line settings
    Serial {
        /// Device path
        path: String,
        /// Parsed parameter suffix
        params: SerialParams,
    },
    /// Network endpoint
    Network(TcpConnectionInfo),
}

impl ConnectionDescriptor {
    /// Resolve a descriptor string.
    ///
    /// Anything whose path part exists on the filesystem is treated as a
    /// serial device; everything else is a network endpoint.
    pub fn resolve(descriptor: &str) -> std::result::Result<Self, ConfigError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(ConfigError::EmptyDescriptor);
        }
        if descriptor == PASSTHROUGH_DESCRIPTOR {
            return Ok(Self::Stdio);
        }

        let (path, parameters) = descriptor.split_once(',').unwrap_or((descriptor, ""));
        if Path::new(path).exists() {
            return Ok(Self::Serial {
                path: path.to_string(),
                params: SerialParams::parse(parameters)?,
            });
        }

        Ok(Self::Network(TcpConnectionInfo::parse(descriptor)?))
    }

    /// Transport this descriptor opens
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio => TransportKind::Stdio,
            Self::Serial { .. } => TransportKind::Serial,
            Self::Network(_) => TransportKind::Network,
        }
    }
}

/// Bidirectional channel to one device
pub struct Connection {
    kind: TransportKind,
    reader: LineReader<Box<dyn InboundChannel>>,
    writer: Box<dyn Write + Send>,
    write_buffer: Vec<u8>,
}

impl Connection {
    /// Resolve and open a descriptor string
    pub fn open(descriptor: &str) -> Result<Self> {
        let resolved = ConnectionDescriptor::resolve(descriptor)?;
        let connection = Self::connect(&resolved)?;
        tracing::info!("Connected to {} via {}", descriptor, connection.kind);
        Ok(connection)
    }

    /// Open an already resolved descriptor
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        match descriptor {
            #[cfg(unix)]
            ConnectionDescriptor::Stdio => Ok(Self::from_parts(
                TransportKind::Stdio,
                Box::new(stdio::PolledInbound::stdin()?),
                Box::new(io::stdout()),
            )),
            #[cfg(not(unix))]
            ConnectionDescriptor::Stdio => Err(gcodestream_core::ConnectionError::FailedToOpen {
                port: PASSTHROUGH_DESCRIPTOR.to_string(),
                reason: "stdio passthrough needs a Unix platform".to_string(),
            }
            .into()),
            ConnectionDescriptor::Serial { path, params } => {
                let (inbound, outbound) = serial::open(path, params)?;
                Ok(Self::from_parts(
                    TransportKind::Serial,
                    Box::new(inbound),
                    Box::new(outbound),
                ))
            }
            ConnectionDescriptor::Network(info) => {
                let stream = tcp::open(info)?;
                let outbound = stream.try_clone()?;
                Ok(Self::from_parts(
                    TransportKind::Network,
                    Box::new(stream),
                    Box::new(outbound),
                ))
            }
        }
    }

    /// Build a connection over arbitrary channels
    pub fn from_parts(
        kind: TransportKind,
        inbound: Box<dyn InboundChannel>,
        outbound: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            kind,
            reader: LineReader::new(inbound, RESPONSE_BUFFER_SIZE, false),
            writer: outbound,
            write_buffer: Vec::new(),
        }
    }

    /// Transport variant
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Discard input until the wire stays silent for `timeout`.
    ///
    /// Many machines produce chatter on connect; this gets into a clean state
    /// before streaming. Discarded bytes are mirrored to `echo` if given.
    /// Returns the number of bytes discarded.
    pub fn discard_pending_input(
        &mut self,
        timeout: Duration,
        mut echo: Option<&mut dyn Write>,
    ) -> Result<usize> {
        let buffered = self.reader.discard_buffered();
        let mut total = buffered.len();
        if let Some(sink) = echo.as_deref_mut() {
            sink.write_all(&buffered)?;
        }

        let inbound = self.reader.get_mut();
        inbound.set_read_timeout(Some(timeout))?;

        let mut buf = [0u8; DISCARD_CHUNK_SIZE];
        let drained = loop {
            match inbound.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    total += n;
                    if let Some(sink) = echo.as_deref_mut() {
                        if let Err(e) = sink.write_all(&buf[..n]) {
                            break Err(e);
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    break Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };

        inbound.set_read_timeout(None)?;
        drained?;
        if let Some(sink) = echo {
            sink.flush()?;
        }
        if total > 0 {
            tracing::debug!("Discarded {} bytes of pending input", total);
        }
        Ok(total)
    }

    /// Write all blocks to the device in one contiguous write.
    ///
    /// Devices with tiny receive queues do better with one larger write than
    /// with many small ones.
    pub fn write_blocks(&mut self, blocks: &[&[u8]]) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        self.write_buffer.clear();
        for block in blocks {
            self.write_buffer.extend_from_slice(block);
        }
        self.writer.write_all(&self.write_buffer)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Line reader over device responses (comments are kept)
    pub fn response_lines(&mut self) -> &mut LineReader<Box<dyn InboundChannel>> {
        &mut self.reader
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("eof", &self.reader.is_eof())
            .finish()
    }
}
