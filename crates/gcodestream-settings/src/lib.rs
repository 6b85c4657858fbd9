//! gcodestream settings
//!
//! Defaults for every streaming tunable, optionally overridden by a TOML or
//! JSON settings file.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, EchoSettings, StreamingSettings};
pub use error::{SettingsError, SettingsResult};
