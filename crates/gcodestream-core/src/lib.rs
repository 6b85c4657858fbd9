//! # gcodestream core
//!
//! Error taxonomy shared by the connection layer, the streaming engine and
//! the command-line front end.

pub mod error;

pub use error::{ConfigError, ConnectionError, Error, ProtocolError, Result};
