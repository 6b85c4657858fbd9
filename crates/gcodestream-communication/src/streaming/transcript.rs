//! Request/response echo
//!
//! The streamer decides *what* to echo; a [`Transcript`] decides how it
//! looks.

use super::response::Ack;
use std::io::{self, IsTerminal, Write};

const MESSAGE_ON: &str = "\x1b[7m";
const MESSAGE_OFF: &str = "\x1b[0m";

/// Receiver of echoed communication
pub trait Transcript {
    /// A block is about to get its first echoed response
    fn request(&mut self, line_number: usize, block: &str);

    /// A response for the most recent request
    fn response(&mut self, ack: &Ack, flow_control: bool);

    /// Where discarded device chatter is mirrored
    fn chatter_sink(&mut self) -> Option<&mut dyn Write> {
        None
    }
}

/// Human readable transcript, normally on stderr
pub struct ConsoleTranscript<W> {
    out: W,
    highlight: bool,
    after_message: bool,
}

impl<W: Write> ConsoleTranscript<W> {
    /// Plain transcript without escape sequences
    pub fn new(out: W) -> Self {
        Self {
            out,
            highlight: false,
            after_message: false,
        }
    }

    /// Reverse-video highlighting of device messages
    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    /// Consume and return the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(text).and_then(|_| self.out.flush()) {
            tracing::debug!("transcript write failed: {}", e);
        }
    }
}

impl ConsoleTranscript<io::Stderr> {
    /// Transcript on stderr, highlighted if it is a terminal
    pub fn stderr() -> Self {
        Self::new(io::stderr()).with_highlight(io::stderr().is_terminal())
    }
}

impl<W: Write> Transcript for ConsoleTranscript<W> {
    fn request(&mut self, line_number: usize, block: &str) {
        self.after_message = false;
        self.emit(format_args!("{line_number:6}\t{block} "));
    }

    fn response(&mut self, ack: &Ack, flow_control: bool) {
        let (on, off) = if self.highlight {
            (MESSAGE_ON, MESSAGE_OFF)
        } else {
            ("", "")
        };
        match ack {
            Ack::Ok => {
                let lead = if self.after_message { "\n" } else { "" };
                let tail = if flow_control { "<< OK" } else { "" };
                self.emit(format_args!("{lead}{tail}\n"));
                self.after_message = false;
            }
            Ack::Message(text) => {
                self.emit(format_args!("\n{on}{text}{off}"));
                self.after_message = true;
            }
            Ack::Error(text) => {
                self.emit(format_args!("\n{on}{text}{off}\n"));
                self.after_message = false;
            }
        }
    }

    fn chatter_sink(&mut self) -> Option<&mut dyn Write> {
        Some(&mut self.out)
    }
}

/// One echoed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Request echo
    Request {
        /// Block number
        line_number: usize,
        /// Block text without newline
        block: String,
    },
    /// Response echo
    Response(Ack),
}

/// Keeps everything in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingTranscript {
    /// Echo events in order
    pub events: Vec<TranscriptEvent>,
    /// Discarded chatter bytes
    pub chatter: Vec<u8>,
}

impl RecordingTranscript {
    /// Responses echoed for block `line_number`
    pub fn responses_for(&self, line_number: usize) -> Vec<Ack> {
        let mut current = None;
        let mut found = Vec::new();
        for event in &self.events {
            match event {
                TranscriptEvent::Request { line_number: n, .. } => current = Some(*n),
                TranscriptEvent::Response(ack) if current == Some(line_number) => {
                    found.push(ack.clone())
                }
                TranscriptEvent::Response(_) => {}
            }
        }
        found
    }
}

impl Transcript for RecordingTranscript {
    fn request(&mut self, line_number: usize, block: &str) {
        self.events.push(TranscriptEvent::Request {
            line_number,
            block: block.to_string(),
        });
    }

    fn response(&mut self, ack: &Ack, _flow_control: bool) {
        self.events.push(TranscriptEvent::Response(ack.clone()));
    }

    fn chatter_sink(&mut self) -> Option<&mut dyn Write> {
        Some(&mut self.chatter)
    }
}
