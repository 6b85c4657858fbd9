use anyhow::Context;
use clap::Parser;
use gcodestream::cli::{Cli, InputSource};
use gcodestream::{init_logging, Config, Connection, LineReader, StreamSummary, Streamer};
use gcodestream_communication::streaming::{policy, ConsoleTranscript};
use std::fs::File;
use std::io::{self, Read};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<StreamSummary> {
    let config = Config::load_or_default(cli.config.as_deref()).context("Loading settings")?;
    let session = cli.resolve(&config)?;

    let input: Box<dyn Read> = match &session.input {
        InputSource::Stdin => Box::new(io::stdin()),
        InputSource::File(path) => Box::new(
            File::open(path).with_context(|| format!("Opening {}", path.display()))?,
        ),
    };
    let mut reader = LineReader::new(input, session.input_buffer_size, session.strip_comments);

    let mut connection = if session.stream.dry_run {
        tracing::info!("Dry run; not connecting to {}", session.descriptor);
        None
    } else {
        Some(Connection::open(&session.descriptor)?)
    };

    let mut policy = policy::for_session(session.stdin_busy());
    let mut transcript = ConsoleTranscript::stderr();
    let mut streamer = Streamer::new(session.stream.clone(), policy.as_mut(), &mut transcript);
    if let Some(connection) = connection.as_mut() {
        streamer = streamer.with_connection(connection);
    }

    let summary = streamer.run(&mut reader)?;
    tracing::info!(
        "{} of {} blocks acknowledged, {} errors accepted",
        summary.lines_acknowledged,
        summary.blocks_sent,
        summary.errors_accepted
    );
    Ok(summary)
}
