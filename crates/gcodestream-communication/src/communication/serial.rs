//! Serial port transport
//!
//! Opens a tty in raw exclusive mode for direct hardware connection to CNC
//! controllers via USB or RS-232.
//!
//! Line discipline applied on open:
//! - 8 data bits, no parity, 1 stop bit
//! - Modem control lines ignored (`CLOCAL`), receiver enabled
//! - RTS/CTS hardware flow control unless `-crtscts` is given
//! - Non-canonical mode: no echo, no signal characters, no CR/NL translation
//! - Reads block until at least one byte is available

use super::InboundChannel;
use gcodestream_core::{ConfigError, ConnectionError, Result};
use std::io::{self, Read};
use std::time::Duration;

/// Baud rates the platform driver accepts
#[cfg(target_os = "linux")]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 250000, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000,
    2500000, 3000000, 3500000, 4000000,
];

/// Baud rates the platform driver accepts
#[cfg(not(target_os = "linux"))]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400,
];

/// Baud rate used when the descriptor has no `b<rate>` parameter
pub const DEFAULT_BAUD_RATE: u32 = 115200;

// serialport has no "wait forever"; blocking reads re-arm this interval.
const BLOCKING_READ_INTERVAL: Duration = Duration::from_secs(3600);

/// Line settings parsed from the descriptor suffix, e.g. `b115200,-crtscts`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialParams {
    /// Line speed, one of [`SUPPORTED_BAUD_RATES`]
    pub baud_rate: u32,
    /// RTS/CTS handshaking
    pub hardware_flow_control: bool,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            hardware_flow_control: true,
        }
    }
}

impl SerialParams {
    /// Parse a comma separated parameter list.
    ///
    /// `b<number>` sets the speed; flags take an optional `+` or `-` prefix.
    /// Empty tokens are skipped.
    pub fn parse(parameters: &str) -> std::result::Result<Self, ConfigError> {
        let mut params = Self::default();
        for token in parameters.split(',').map(str::trim) {
            if token.is_empty() {
                continue;
            }

            if let Some(speed) = token.strip_prefix(['b', 'B']) {
                let baud = speed.parse::<u32>().map_err(|_| ConfigError::InvalidBaudRate {
                    token: token.to_string(),
                })?;
                params.baud_rate = check_baud_rate(baud)?;
                continue;
            }

            let (enable, flag) = if let Some(rest) = token.strip_prefix('+') {
                (true, rest)
            } else if let Some(rest) = token.strip_prefix('-') {
                (false, rest)
            } else {
                (true, token)
            };
            match flag {
                "crtscts" => params.hardware_flow_control = enable,
                other => {
                    return Err(ConfigError::UnknownOption {
                        option: other.to_string(),
                    })
                }
            }
        }
        Ok(params)
    }
}

/// Look a rate up in the platform table
pub fn check_baud_rate(baud: u32) -> std::result::Result<u32, ConfigError> {
    if SUPPORTED_BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(ConfigError::UnsupportedBaudRate {
            baud,
            supported: SUPPORTED_BAUD_RATES
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Inbound half of an open serial port
pub struct SerialInbound {
    port: Box<dyn serialport::SerialPort>,
    blocking: bool,
}

impl Read for SerialInbound {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.port.read(buf) {
                Err(e) if self.blocking && e.kind() == io::ErrorKind::TimedOut => continue,
                result => return result,
            }
        }
    }
}

impl InboundChannel for SerialInbound {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.blocking = timeout.is_none();
        self.port
            .set_timeout(timeout.unwrap_or(BLOCKING_READ_INTERVAL))
            .map_err(io::Error::from)
    }
}

/// Open `path` as a raw serial line.
///
/// Returns the inbound half and a cloned handle used for writing.
pub fn open(
    path: &str,
    params: &SerialParams,
) -> Result<(SerialInbound, Box<dyn serialport::SerialPort>)> {
    let builder = serialport::new(path, params.baud_rate)
        .timeout(BLOCKING_READ_INTERVAL)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(if params.hardware_flow_control {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        });

    let port = match builder.open() {
        Ok(port) => port,
        Err(e) => {
            tracing::warn!("Failed to open serial port {}: {}", path, e);
            return Err(failed_to_open(path, e).into());
        }
    };
    let writer = port.try_clone().map_err(|e| failed_to_open(path, e))?;

    tracing::debug!(
        "Opened {} at {} baud (8N1, crtscts {})",
        path,
        params.baud_rate,
        if params.hardware_flow_control { "on" } else { "off" }
    );

    Ok((
        SerialInbound {
            port,
            blocking: true,
        },
        writer,
    ))
}

fn failed_to_open(path: &str, e: serialport::Error) -> ConnectionError {
    ConnectionError::FailedToOpen {
        port: path.to_string(),
        reason: e.to_string(),
    }
}
