//! Command line arguments and how they combine with the settings file

use anyhow::bail;
use clap::{ArgAction, Parser};
use gcodestream_communication::communication::PASSTHROUGH_DESCRIPTOR;
use gcodestream_communication::{EchoConfig, StreamConfig};
use gcodestream_settings::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Descriptor that turns every run into a dry run
pub const NULL_DEVICE: &str = "/dev/null";

/// Stream a G-code file to a machine, waiting for `ok` after each block.
///
/// The connection is `-` for stdin/stdout passthrough,
/// `<path>[,b<baud>][,[+|-]crtscts]` for a serial device, or `<host>[:<port>]`
/// for a network device (default port 8888).
#[derive(Debug, Parser)]
#[command(name = "gcodestream", version = crate::LONG_VERSION)]
pub struct Cli {
    /// G-code file to send, or `-` for stdin
    pub gcode_file: String,

    /// Device connection; defaults to the settings file value
    pub connection: Option<String>,

    /// Wait this many milliseconds for the machine to go quiet before the
    /// first and after the last block
    #[arg(short = 's', long = "settle", value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Number of blocks sent before waiting for acknowledgements
    #[arg(short = 'b', long = "buffer", value_name = "COUNT", value_parser = parse_depth)]
    pub pipeline_depth: Option<usize>,

    /// Send `;` comments instead of stripping them
    #[arg(short = 'c', long)]
    pub keep_comments: bool,

    /// Read and echo the input without sending anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Less output; repeat to also hide informational device messages
    #[arg(short = 'q', long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Don't wait for `ok`; just send
    #[arg(short = 'F', long)]
    pub no_flow_control: bool,

    /// Settings file (.toml or .json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

fn parse_depth(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(depth) => Ok(depth),
        Err(e) => Err(e.to_string()),
    }
}

/// Where the G-code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Standard input
    Stdin,
    /// A file on disk
    File(PathBuf),
}

/// Everything a run needs, after merging arguments over settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub input: InputSource,
    pub descriptor: String,
    pub strip_comments: bool,
    pub input_buffer_size: usize,
    pub stream: StreamConfig,
}

impl Session {
    /// Whether stdin is taken by the input or the device
    pub fn stdin_busy(&self) -> bool {
        self.input == InputSource::Stdin || self.descriptor == PASSTHROUGH_DESCRIPTOR
    }
}

impl Cli {
    /// Merge arguments over `config`
    pub fn resolve(&self, config: &Config) -> anyhow::Result<Session> {
        let input = if self.gcode_file == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(&self.gcode_file))
        };
        let descriptor = self
            .connection
            .clone()
            .unwrap_or_else(|| config.connection.descriptor.clone());

        if input == InputSource::Stdin && descriptor == PASSTHROUGH_DESCRIPTOR {
            bail!("Can't use stdin for both G-code input and device responses");
        }

        let streaming = &config.streaming;
        let mut echo = EchoConfig {
            communication: config.echo.communication,
            unusual_messages: config.echo.unusual_messages,
            errors: config.echo.errors,
        };
        if self.quiet > 0 {
            let quiet = EchoConfig::for_quiet_level(self.quiet);
            echo.communication &= quiet.communication;
            echo.unusual_messages &= quiet.unusual_messages;
        }

        let stream = StreamConfig {
            pipeline_depth: self.pipeline_depth.unwrap_or(streaming.pipeline_depth),
            flow_control: streaming.flow_control && !self.no_flow_control,
            dry_run: self.dry_run || descriptor == NULL_DEVICE,
            settle_timeout: self
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| streaming.settle_timeout()),
            echo,
        };

        Ok(Session {
            input,
            descriptor,
            strip_comments: streaming.strip_comments && !self.keep_comments,
            input_buffer_size: streaming.input_buffer_size,
            stream,
        })
    }
}
