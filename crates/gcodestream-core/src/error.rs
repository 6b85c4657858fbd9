//! Error handling for gcodestream
//!
//! Errors are grouped by the stage that produces them:
//! - Connection errors (device or host could not be reached)
//! - Configuration errors (bad descriptor parameters, unsupported baud)
//! - Protocol errors (the device rejected a block or went away mid-ack)
//!
//! All error types use `thiserror`.

use thiserror::Error;

/// Connection error type
///
/// Raised while opening the channel to the device. Always fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open a serial device
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The device path that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Failed to resolve hostname
    #[error("Not a tty and can't resolve as TCP endpoint '{hostname}' (port {port}): {reason}")]
    HostnameResolution {
        /// The hostname that failed to resolve.
        hostname: String,
        /// The port that was requested.
        port: u16,
        /// The resolver error.
        reason: String,
    },

    /// TCP connection error
    #[error("TCP connection to {address} failed: {reason}")]
    TcpError {
        /// The address that was tried.
        address: String,
        /// The reason for the TCP error.
        reason: String,
    },
}

/// Configuration error type
///
/// Raised while interpreting a connection descriptor. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Baud rate not in the platform table
    #[error("Invalid speed '{baud}'; valid speeds are [{supported}]")]
    UnsupportedBaudRate {
        /// The unsupported baud rate.
        baud: u32,
        /// Comma separated list of supported rates.
        supported: String,
    },

    /// Baud token that is not a number
    #[error("Invalid speed parameter '{token}'")]
    InvalidBaudRate {
        /// The offending token, including its `b` prefix.
        token: String,
    },

    /// Unknown serial option
    #[error("Unknown option {option}")]
    UnknownOption {
        /// The option name with any +/- prefix removed.
        option: String,
    },

    /// Port part of `host:port` is not a valid port number
    #[error("Invalid port '{port}' in '{descriptor}'")]
    InvalidPort {
        /// The full descriptor.
        descriptor: String,
        /// The text after the colon.
        port: String,
    },

    /// Empty connection descriptor
    #[error("Empty connection descriptor")]
    EmptyDescriptor,
}

/// Protocol error type
///
/// A terminal failure acknowledgement for one block. Handed to the
/// escalation policy, which decides whether the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Device answered with `error...` or `alarm...`
    #[error("Block {line_number} '{block}' rejected: {message}")]
    DeviceError {
        /// 1-based number of the block among sent blocks.
        line_number: usize,
        /// The block text without its trailing newline.
        block: String,
        /// The response line as received.
        message: String,
    },

    /// Inbound side reached end-of-stream while a block was pending
    #[error("Block {line_number} '{block}': Nothing received from machine: Connection closed")]
    ConnectionClosed {
        /// 1-based number of the block among sent blocks.
        line_number: usize,
        /// The block text without its trailing newline.
        block: String,
    },
}

impl ProtocolError {
    /// Number of the block this error belongs to
    pub fn line_number(&self) -> usize {
        match self {
            Self::DeviceError { line_number, .. } | Self::ConnectionClosed { line_number, .. } => {
                *line_number
            }
        }
    }
}

/// Main error type for gcodestream
///
/// A unified error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection could not be established
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Descriptor or parameter problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Device reported a failure that was not accepted by the policy
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operator declined to continue after a protocol error
    #[error("Stopped by user after block {line_number}")]
    UserAbort {
        /// Block that triggered the prompt.
        line_number: usize,
    },

    /// Read or write failure mid-session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this happened before any block was sent
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Config(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if the operator stopped the run
    pub fn is_user_abort(&self) -> bool {
        matches!(self, Error::UserAbort { .. })
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
