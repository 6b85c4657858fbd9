//! Acknowledgement classification
//!
//! Machines answer each block with a line starting with `ok`, or with
//! `error`/`alarm` when the block failed. Anything else (temperature reports,
//! status lines, echo) is informational and the block is still pending.

use crate::communication::line_reader::LineReader;
use std::io::{self, Read};

/// Text used when the device goes away while an acknowledgement is pending
pub const CONNECTION_CLOSED_MESSAGE: &str = "Nothing received from machine: Connection closed";

/// Classified response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Block accepted
    Ok,
    /// Block failed; carries the response text
    Error(String),
    /// Informational line; the block is still awaiting its terminal response
    Message(String),
}

impl Ack {
    /// Ok and Error end the wait for a block
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Ack::Message(_))
    }

    /// Response text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Ack::Ok => None,
            Ack::Error(text) | Ack::Message(text) => Some(text),
        }
    }
}

/// Classify one response line (trailing newline optional)
pub fn classify(line: &[u8]) -> Ack {
    if has_prefix_ignore_case(line, b"ok") {
        return Ack::Ok;
    }

    let text = String::from_utf8_lossy(line).trim_end().to_string();
    if has_prefix_ignore_case(line, b"error") || has_prefix_ignore_case(line, b"alarm") {
        Ack::Error(text)
    } else {
        Ack::Message(text)
    }
}

/// Read and classify the next response line.
///
/// Returns `None` when the device closed the connection.
pub fn read_ack<R: Read>(responses: &mut LineReader<R>) -> io::Result<Option<Ack>> {
    Ok(responses.read_line()?.map(classify))
}

fn has_prefix_ignore_case(line: &[u8], prefix: &[u8]) -> bool {
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}
