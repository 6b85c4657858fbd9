//! Flow-controlled streaming of blocks to a device

pub mod policy;
pub mod response;
pub mod streamer;
pub mod transcript;

pub use policy::{for_session, AbortOnError, ContinueOnError, ErrorPolicy, InteractivePrompt};
pub use response::{classify, Ack};
pub use streamer::{EchoConfig, StreamConfig, StreamSummary, Streamer, DEFAULT_SETTLE_TIMEOUT};
pub use transcript::{ConsoleTranscript, RecordingTranscript, Transcript, TranscriptEvent};
