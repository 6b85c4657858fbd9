//! Escalation policy for device-reported errors
//!
//! When a block is answered with `error`/`alarm` (or the connection drops
//! while waiting), the streamer asks an [`ErrorPolicy`] whether to carry on
//! with the next block. Interactive sessions ask the operator; unattended
//! runs always stop.

use gcodestream_core::{Error, ProtocolError, Result};
use std::io::{self, BufRead, IsTerminal, Write};

const ALERT_ON: &str = "\x1b[41m\x1b[30m";
const ALERT_OFF: &str = "\x1b[0m";

/// Decides what happens after a protocol error
pub trait ErrorPolicy {
    /// `Ok(())` resumes at the next block; an error ends the run.
    fn on_protocol_error(&mut self, error: ProtocolError) -> Result<()>;
}

/// Non-interactive: every protocol error is fatal
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortOnError;

impl ErrorPolicy for AbortOnError {
    fn on_protocol_error(&mut self, error: ProtocolError) -> Result<()> {
        tracing::error!(
            "Received error. Non-interactive session does not allow for user feedback. Bailing out."
        );
        Err(error.into())
    }
}

/// Accepts every protocol error and keeps streaming
#[derive(Debug, Default, Clone)]
pub struct ContinueOnError {
    /// Errors seen so far
    pub accepted: Vec<ProtocolError>,
}

impl ErrorPolicy for ContinueOnError {
    fn on_protocol_error(&mut self, error: ProtocolError) -> Result<()> {
        self.accepted.push(error);
        Ok(())
    }
}

/// Asks the operator: ENTER continues, `q` (or end of input) stops
pub struct InteractivePrompt<R, W> {
    input: R,
    output: W,
    highlight: bool,
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    /// Prompt on `output`, read answers from `input`
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            highlight: false,
        }
    }

    /// Colour the prompt with ANSI escapes
    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }
}

impl InteractivePrompt<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on the controlling terminal
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr()).with_highlight(io::stderr().is_terminal())
    }
}

impl<R: BufRead, W: Write> ErrorPolicy for InteractivePrompt<R, W> {
    fn on_protocol_error(&mut self, error: ProtocolError) -> Result<()> {
        let (on, off) = if self.highlight {
            (ALERT_ON, ALERT_OFF)
        } else {
            ("", "")
        };
        writeln!(
            self.output,
            "{on}[ Didn't get OK. Continue: ENTER; stop: q + ENTER or CTRL-C ]{off}"
        )?;
        self.output.flush()?;

        let mut answer = String::new();
        let read = self.input.read_line(&mut answer)?;
        let stop = read == 0 || matches!(answer.trim(), "q" | "Q" | "quit" | "stop");
        if stop {
            tracing::info!("Stopping after: {}", error);
            return Err(Error::UserAbort {
                line_number: error.line_number(),
            });
        }

        tracing::info!("Operator chose to continue after block {}", error.line_number());
        Ok(())
    }
}

/// Policy for this process: prompt if stdin is a terminal, otherwise abort.
///
/// `stdin_busy` must be set when stdin already carries the G-code input or
/// the passthrough device's responses.
pub fn for_session(stdin_busy: bool) -> Box<dyn ErrorPolicy> {
    if !stdin_busy && io::stdin().is_terminal() {
        Box::new(InteractivePrompt::stdio())
    } else {
        Box::new(AbortOnError)
    }
}
