//! Passthrough transport over stdin/stdout
//!
//! Blocks are written to stdout and responses read from stdin, which is handy
//! for debugging or wiring the streamer to other tools with e.g. `socat`.
//!
//! Reads go straight to a duplicate of file descriptor 0, bypassing std's
//! buffered `Stdin`, so a `poll` readiness wait sees every pending byte.

use super::InboundChannel;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::time::Duration;

/// Inbound channel over a pollable file descriptor
pub struct PolledInbound<F> {
    source: F,
    timeout: Option<Duration>,
}

impl PolledInbound<File> {
    /// Unbuffered reader over the process's stdin
    pub fn stdin() -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self::new(File::from(fd)))
    }
}

impl<F: AsFd + Read> PolledInbound<F> {
    /// Wrap `source`; reads block until `set_read_timeout` says otherwise
    pub fn new(source: F) -> Self {
        Self {
            source,
            timeout: None,
        }
    }

    /// Wait until `source` is readable. `false` if `timeout` elapsed first.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let timeout = PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX);
        loop {
            let mut fds = [PollFd::new(self.source.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<F: AsFd + Read> Read for PolledInbound<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(timeout) = self.timeout {
            if !self.wait_readable(timeout)? {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no input pending"));
            }
        }
        self.source.read(buf)
    }
}

impl<F: AsFd + Read + Send> InboundChannel for PolledInbound<F> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_timeout_when_nothing_pending() {
        let (_writer, reader) = UnixStream::pair().unwrap();
        let mut inbound = PolledInbound::new(reader);
        inbound
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let err = inbound.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_pending_bytes_are_read_in_timed_mode() {
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let mut inbound = PolledInbound::new(reader);
        inbound
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        writer.write_all(b"ok\n").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(inbound.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"ok\n");
    }

    #[test]
    fn test_closed_peer_reads_end_of_stream() {
        let (writer, reader) = UnixStream::pair().unwrap();
        let mut inbound = PolledInbound::new(reader);
        drop(writer);

        inbound
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(inbound.read(&mut [0u8; 8]).unwrap(), 0);

        inbound.set_read_timeout(None).unwrap();
        assert_eq!(inbound.read(&mut [0u8; 8]).unwrap(), 0);
    }
}
