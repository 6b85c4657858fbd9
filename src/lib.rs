//! # gcodestream
//!
//! Streams G-code to CNC machines, 3D printers and laser cutters, pacing
//! transmission by the `ok` each block is answered with.
//!
//! ## Architecture
//!
//! 1. **gcodestream-core** - Error taxonomy shared by all crates
//! 2. **gcodestream-communication** - Line framing, serial/TCP/stdio transports, streaming engine
//! 3. **gcodestream-settings** - Settings file with defaults for every tunable
//! 4. **gcodestream** - Command line front end

pub mod cli;

pub use gcodestream_communication::{
    Connection, ConnectionDescriptor, LineReader, StreamConfig, StreamSummary, Streamer,
    TransportKind,
};
pub use gcodestream_core::{Error, Result};
pub use gcodestream_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Version string shown by `--version`
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("BUILD_DATE"),
    ")"
);

/// Initialize logging
///
/// Diagnostics go to stderr since stdout may be the device in passthrough
/// mode. `RUST_LOG` overrides the default level, which is `info`, or `warn`
/// when `quiet` is non-zero.
pub fn init_logging(quiet: u8) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if quiet > 0 {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
