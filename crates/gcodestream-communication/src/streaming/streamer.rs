//! Flow-controlled G-code streaming
//!
//! Blocks are written in batches of up to `pipeline_depth`. With flow
//! control, every block of a batch must be answered with `ok` (or an error)
//! before the next batch goes out; informational lines in between are
//! echoed and otherwise ignored.

use super::policy::ErrorPolicy;
use super::response::{read_ack, Ack, CONNECTION_CLOSED_MESSAGE};
use super::transcript::Transcript;
use crate::communication::line_reader::LineReader;
use crate::communication::Connection;
use gcodestream_core::{Error, ProtocolError, Result};
use std::io::Read;
use std::time::{Duration, Instant};

/// Default quiet period awaited before the first and after the last block
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(2500);

/// Which exchanges are echoed to the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoConfig {
    /// Every request and response
    pub communication: bool,
    /// Informational responses, even when communication echo is off
    pub unusual_messages: bool,
    /// Error responses, even when communication echo is off
    pub errors: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            communication: true,
            unusual_messages: true,
            errors: true,
        }
    }
}

impl EchoConfig {
    /// Echo settings for a `-q` count: one silences the regular exchange,
    /// two also silences informational messages. Errors always show.
    pub fn for_quiet_level(level: u8) -> Self {
        Self {
            communication: level == 0,
            unusual_messages: level < 2,
            errors: true,
        }
    }

    fn shows(&self, ack: &Ack) -> bool {
        match ack {
            Ack::Ok => self.communication,
            Ack::Message(_) => self.communication || self.unusual_messages,
            Ack::Error(_) => self.communication || self.errors,
        }
    }
}

/// Streaming parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Blocks written per batch
    pub pipeline_depth: usize,
    /// Wait for an acknowledgement per block
    pub flow_control: bool,
    /// Don't touch the device; treat every block as acknowledged
    pub dry_run: bool,
    /// Silence window for discarding chatter
    pub settle_timeout: Duration,
    /// Echo selection
    pub echo: EchoConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pipeline_depth: 1,
            flow_control: true,
            dry_run: false,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            echo: EchoConfig::default(),
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Blocks taken from the input
    pub blocks_sent: usize,
    /// Blocks answered with `ok` (or assumed so)
    pub lines_acknowledged: usize,
    /// Protocol errors the policy let pass
    pub errors_accepted: usize,
    /// Writes issued to the device
    pub batches_written: usize,
    /// Bytes discarded before the first block
    pub startup_chatter: usize,
    /// Bytes received after the last acknowledgement
    pub trailing_bytes: usize,
    /// Time from first write to last acknowledgement
    pub elapsed: Duration,
}

/// Drives one input through one connection
pub struct Streamer<'a> {
    config: StreamConfig,
    connection: Option<&'a mut Connection>,
    policy: &'a mut dyn ErrorPolicy,
    transcript: &'a mut dyn Transcript,
}

impl<'a> Streamer<'a> {
    /// Streamer without a device; only usable for dry runs until
    /// [`Streamer::with_connection`] is called
    pub fn new(
        config: StreamConfig,
        policy: &'a mut dyn ErrorPolicy,
        transcript: &'a mut dyn Transcript,
    ) -> Self {
        Self {
            config,
            connection: None,
            policy,
            transcript,
        }
    }

    /// Attach the device connection
    pub fn with_connection(mut self, connection: &'a mut Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Stream every block of `input`.
    ///
    /// Fails on I/O errors and on protocol errors the policy refuses.
    pub fn run<R: Read>(&mut self, input: &mut LineReader<R>) -> Result<StreamSummary> {
        let dry_run = self.config.dry_run;
        let flow_control = self.config.flow_control && !dry_run;
        let depth = self.config.pipeline_depth.max(1);
        let mut summary = StreamSummary::default();

        if !dry_run {
            let connection = self
                .connection
                .as_deref_mut()
                .ok_or_else(|| Error::other("no device connection"))?;
            let sink = if self.config.echo.communication {
                self.transcript.chatter_sink()
            } else {
                None
            };
            summary.startup_chatter =
                connection.discard_pending_input(self.config.settle_timeout, sink)?;
            if summary.startup_chatter > 0 {
                tracing::info!(
                    "Discarded {} bytes of initial machine chatter",
                    summary.startup_chatter
                );
            }
        }

        tracing::info!(
            "Streaming with pipeline depth {}{}{}",
            depth,
            if flow_control { "" } else { ", no flow control" },
            if dry_run { ", dry run" } else { "" }
        );

        let start = Instant::now();
        while !input.is_eof() {
            let blocks = input.read_next_lines(depth)?;
            if blocks.is_empty() {
                continue;
            }

            if let Some(connection) = self.connection.as_deref_mut().filter(|_| !dry_run) {
                connection.write_blocks(&blocks)?;
                summary.batches_written += 1;
                tracing::trace!("Wrote batch of {} blocks", blocks.len());
            }

            for block in &blocks {
                summary.blocks_sent += 1;
                self.await_acknowledgement(summary.blocks_sent, block, flow_control, &mut summary)?;
            }
        }
        summary.elapsed = start.elapsed();

        tracing::info!(
            "Sent total of {} non-empty lines in {:.1}s",
            summary.blocks_sent,
            summary.elapsed.as_secs_f64()
        );

        if !dry_run {
            summary.trailing_bytes = self.discard_trailing();
        }
        Ok(summary)
    }

    fn await_acknowledgement(
        &mut self,
        line_number: usize,
        block: &[u8],
        flow_control: bool,
        summary: &mut StreamSummary,
    ) -> Result<()> {
        let text = block_text(block);
        let mut request_echoed = false;

        loop {
            let (ack, closed) = if flow_control {
                let connection = self
                    .connection
                    .as_deref_mut()
                    .ok_or_else(|| Error::other("no device connection"))?;
                match read_ack(connection.response_lines())? {
                    Some(ack) => (ack, false),
                    None => (Ack::Error(CONNECTION_CLOSED_MESSAGE.to_string()), true),
                }
            } else {
                (Ack::Ok, false)
            };

            if self.config.echo.shows(&ack) {
                if !request_echoed {
                    self.transcript.request(line_number, &text);
                    request_echoed = true;
                }
                self.transcript.response(&ack, flow_control);
            }

            match ack {
                Ack::Ok => {
                    summary.lines_acknowledged += 1;
                    return Ok(());
                }
                Ack::Message(message) => {
                    tracing::debug!(line_number, "Device message: {}", message);
                }
                Ack::Error(message) => {
                    let error = if closed {
                        ProtocolError::ConnectionClosed {
                            line_number,
                            block: text,
                        }
                    } else {
                        ProtocolError::DeviceError {
                            line_number,
                            block: text,
                            message,
                        }
                    };
                    tracing::warn!("{}", error);
                    self.policy.on_protocol_error(error)?;
                    summary.errors_accepted += 1;
                    return Ok(());
                }
            }
        }
    }

    /// Drain responses arriving after the last block. Read failures here
    /// only get logged.
    fn discard_trailing(&mut self) -> usize {
        let Some(connection) = self.connection.as_deref_mut() else {
            return 0;
        };
        tracing::info!("Discarding remaining machine responses");
        let sink = if self.config.echo.unusual_messages {
            self.transcript.chatter_sink()
        } else {
            None
        };
        match connection.discard_pending_input(self.config.settle_timeout, sink) {
            Ok(0) => 0,
            Ok(n) => {
                tracing::warn!("Skipped {} bytes of unexpected responses after last block", n);
                n
            }
            Err(e) => {
                tracing::warn!("Failed to drain trailing responses: {}", e);
                0
            }
        }
    }
}

/// Block without its newline, for echo and error reports
fn block_text(block: &[u8]) -> String {
    let body = block.strip_suffix(b"\n").unwrap_or(block);
    String::from_utf8_lossy(body).into_owned()
}
