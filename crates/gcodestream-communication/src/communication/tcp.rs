//! TCP transport
//!
//! For controllers that accept G-code over a socket (e.g. BeagleG), addressed
//! as `host[:port]`.

use super::InboundChannel;
use gcodestream_core::{ConfigError, ConnectionError, Result};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Port used when the descriptor has none
pub const DEFAULT_TCP_PORT: u16 = 8888;

/// Parsed `host[:port]` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnectionInfo {
    /// Hostname or IP literal (brackets removed for IPv6)
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl TcpConnectionInfo {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`
    pub fn parse(descriptor: &str) -> std::result::Result<Self, ConfigError> {
        if descriptor.is_empty() {
            return Err(ConfigError::EmptyDescriptor);
        }

        let (host, port) = if let Some(rest) = descriptor.strip_prefix('[') {
            match rest.split_once(']') {
                Some((host, tail)) => (host, tail.strip_prefix(':')),
                None => (descriptor, None),
            }
        } else {
            match descriptor.split_once(':') {
                // More than one colon: bare IPv6 literal without port.
                Some((_, tail)) if tail.contains(':') => (descriptor, None),
                Some((host, port)) => (host, Some(port)),
                None => (descriptor, None),
            }
        };

        let port = match port {
            Some(text) => text.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                descriptor: descriptor.to_string(),
                port: text.to_string(),
            })?,
            None => DEFAULT_TCP_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// `host:port` for display
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Resolve and connect, trying each resolved address in turn
pub fn open(info: &TcpConnectionInfo) -> Result<TcpStream> {
    let addresses = (info.host.as_str(), info.port)
        .to_socket_addrs()
        .map_err(|e| ConnectionError::HostnameResolution {
            hostname: info.host.clone(),
            port: info.port,
            reason: e.to_string(),
        })?;

    let mut last_error = None;
    for address in addresses {
        match TcpStream::connect(address) {
            Ok(stream) => {
                // Blocks are small; don't let Nagle hold them back.
                stream.set_nodelay(true)?;
                tracing::debug!("Connected to {} ({})", info.address(), address);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("connect({}) failed: {}", address, e);
                last_error = Some(e);
            }
        }
    }

    Err(ConnectionError::TcpError {
        address: info.address(),
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string()),
    }
    .into())
}

impl InboundChannel for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // A zero timeout is rejected by the socket API.
        TcpStream::set_read_timeout(self, timeout.map(|t| t.max(Duration::from_millis(1))))
    }
}
