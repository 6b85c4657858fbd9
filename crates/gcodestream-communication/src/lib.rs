//! # gcodestream communication
//!
//! Everything between a G-code file and a machine:
//! - [`communication::line_reader`]: block framing for files and device responses
//! - [`communication`]: serial, TCP and stdio transports behind one [`Connection`]
//! - [`streaming`]: pipelined, acknowledgement-driven streaming

pub mod communication;
pub mod streaming;

pub use communication::{
    line_reader::LineReader, serial::SerialParams, tcp::TcpConnectionInfo, Connection,
    ConnectionDescriptor, InboundChannel, TransportKind,
};
pub use streaming::{
    Ack, AbortOnError, ConsoleTranscript, ContinueOnError, EchoConfig, ErrorPolicy,
    InteractivePrompt, RecordingTranscript, StreamConfig, StreamSummary, Streamer, Transcript,
};
