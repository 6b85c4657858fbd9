use gcodestream_communication::streaming::TranscriptEvent;
use gcodestream_communication::{
    Ack, AbortOnError, Connection, ContinueOnError, InboundChannel, LineReader,
    RecordingTranscript, StreamConfig, Streamer, TransportKind,
};
use gcodestream_core::{Error, ProtocolError};
use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Scripted device: every newline written releases the next canned reply.
#[derive(Default)]
struct DeviceState {
    replies: VecDeque<&'static str>,
    readable: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    timeout: bool,
    unplugged: bool,
}

#[derive(Clone, Default)]
struct MockDevice(Arc<Mutex<DeviceState>>);

impl MockDevice {
    fn new(chatter: &str, replies: &[&'static str]) -> Self {
        let device = Self::default();
        {
            let mut state = device.0.lock().unwrap();
            state.readable.extend(chatter.bytes());
            state.replies.extend(replies.iter().copied());
        }
        device
    }

    fn connection(&self) -> Connection {
        Connection::from_parts(
            TransportKind::Serial,
            Box::new(self.clone()),
            Box::new(MockOutbound(self.clone())),
        )
    }

    fn writes(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.lock().unwrap();
        if state.readable.is_empty() {
            if state.timeout {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"));
            }
            return Ok(0);
        }
        let n = buf.len().min(state.readable.len());
        for (slot, byte) in buf.iter_mut().zip(state.readable.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl InboundChannel for MockDevice {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.lock().unwrap().timeout = timeout.is_some();
        Ok(())
    }
}

struct MockOutbound(MockDevice);

impl Write for MockOutbound {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = (self.0).0.lock().unwrap();
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state.writes.push(buf.to_vec());
        for _ in buf.iter().filter(|&&b| b == b'\n') {
            if let Some(reply) = state.replies.pop_front() {
                state.readable.extend(reply.bytes());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn gcode(text: &str) -> LineReader<Cursor<Vec<u8>>> {
    LineReader::new(Cursor::new(text.as_bytes().to_vec()), 4096, true)
}

fn config(depth: usize) -> StreamConfig {
    StreamConfig {
        pipeline_depth: depth,
        settle_timeout: Duration::from_millis(10),
        ..StreamConfig::default()
    }
}

#[test]
fn test_informational_message_keeps_block_pending() {
    let device = MockDevice::new("", &["ok\n", "Temp:200\nok\n"]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();

    let summary = Streamer::new(config(2), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G1 X10\nG1 Y5\n"))
        .unwrap();

    assert_eq!(summary.startup_chatter, 0);
    assert_eq!(summary.trailing_bytes, 0);
    assert_eq!(summary.blocks_sent, 2);
    assert_eq!(summary.lines_acknowledged, 2);
    assert_eq!(summary.batches_written, 1);
    assert_eq!(device.writes(), vec!["G1 X10\nG1 Y5\n"]);
    assert_eq!(transcript.responses_for(1), vec![Ack::Ok]);
    assert_eq!(
        transcript.responses_for(2),
        vec![Ack::Message("Temp:200".to_string()), Ack::Ok]
    );
}

#[test]
fn test_device_error_stops_unattended_run() {
    let device = MockDevice::new("", &["error: limit switch\n", "ok\n"]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();

    let err = Streamer::new(config(1), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G1 X999\nG1 X0\n"))
        .unwrap_err();

    match err {
        Error::Protocol(ProtocolError::DeviceError {
            line_number,
            block,
            message,
        }) => {
            assert_eq!(line_number, 1);
            assert_eq!(block, "G1 X999");
            assert_eq!(message, "error: limit switch");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(device.writes(), vec!["G1 X999\n"]);
    assert_eq!(
        transcript.responses_for(1),
        vec![Ack::Error("error: limit switch".to_string())]
    );
}

#[test]
fn test_write_failure_aborts_run() {
    let device = MockDevice::new("", &["ok\n", "ok\n"]);
    device.0.lock().unwrap().unplugged = true;
    let mut connection = device.connection();
    let mut policy = ContinueOnError::default();
    let mut transcript = RecordingTranscript::default();

    let err = Streamer::new(config(2), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G1 X1\nG1 X2\n"))
        .unwrap_err();

    match err {
        Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("unexpected {other:?}"),
    }
    assert!(device.writes().is_empty());
    assert!(transcript.events.is_empty());
    assert!(policy.accepted.is_empty());
}

#[test]
fn test_accepted_error_continues_with_next_block() {
    let device = MockDevice::new("", &["ALARM:1\n", "ok\n"]);
    let mut connection = device.connection();
    let mut policy = ContinueOnError::default();
    let mut transcript = RecordingTranscript::default();

    let summary = Streamer::new(config(1), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G1 X999\nG1 X0\n"))
        .unwrap();

    assert_eq!(summary.errors_accepted, 1);
    assert_eq!(summary.lines_acknowledged, 1);
    assert_eq!(device.writes().len(), 2);
    assert_eq!(policy.accepted.len(), 1);
}

#[test]
fn test_batches_are_ceil_of_blocks_over_depth() {
    let device = MockDevice::new("", &["ok\n"; 5]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();

    let summary = Streamer::new(config(2), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("M3\nG1 X1\nG1 X2\nG1 X3\nM5\n"))
        .unwrap();

    assert_eq!(summary.batches_written, 3);
    assert_eq!(
        device.writes(),
        vec!["M3\nG1 X1\n", "G1 X2\nG1 X3\n", "M5\n"]
    );
}

#[test]
fn test_startup_chatter_and_trailing_responses_are_discarded() {
    let device = MockDevice::new("Grbl 1.1h ['$' for help]\n", &["ok\n", "ok\nstray\n"]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();

    let summary = Streamer::new(config(1), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G0 X0\nG0 X1\n"))
        .unwrap();

    assert_eq!(summary.startup_chatter, 25);
    assert_eq!(summary.trailing_bytes, 6);
    assert_eq!(summary.lines_acknowledged, 2);
    let chatter = String::from_utf8(transcript.chatter.clone()).unwrap();
    assert!(chatter.starts_with("Grbl 1.1h"));
    assert!(chatter.ends_with("stray\n"));
}

#[test]
fn test_without_flow_control_nothing_is_read() {
    let device = MockDevice::new("", &[]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();
    let config = StreamConfig {
        flow_control: false,
        ..config(3)
    };

    let summary = Streamer::new(config, &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("M3\nM5\n"))
        .unwrap();

    assert_eq!(summary.lines_acknowledged, 2);
    assert_eq!(device.writes(), vec!["M3\nM5\n"]);
}

#[test]
fn test_connection_closed_while_waiting() {
    let device = MockDevice::new("", &["ok\n"]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();

    let err = Streamer::new(config(1), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("M3\nM5\n"))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::ConnectionClosed { line_number: 2, .. })
    ));
}

#[test]
fn test_request_echoed_once_per_block() {
    let device = MockDevice::new("", &["echo:busy\necho:busy\nok\n"]);
    let mut connection = device.connection();
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();

    Streamer::new(config(1), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G28\n"))
        .unwrap();

    let requests = transcript
        .events
        .iter()
        .filter(|e| matches!(e, TranscriptEvent::Request { .. }))
        .count();
    assert_eq!(requests, 1);
    assert_eq!(transcript.responses_for(1).len(), 3);
}

#[test]
fn test_streams_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = io::BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let mut received = Vec::new();
        let mut line = String::new();
        while io::BufRead::read_line(&mut reader, &mut line).unwrap() > 0 {
            received.push(line.trim_end().to_string());
            writer.write_all(b"ok\n").unwrap();
            line.clear();
        }
        received
    });

    let mut connection = Connection::open(&format!("127.0.0.1:{port}")).unwrap();
    assert_eq!(connection.kind(), TransportKind::Network);
    let mut policy = AbortOnError;
    let mut transcript = RecordingTranscript::default();
    let summary = Streamer::new(config(2), &mut policy, &mut transcript)
        .with_connection(&mut connection)
        .run(&mut gcode("G21 ; mm\nG90\nG0 X5\n"))
        .unwrap();
    assert_eq!(summary.lines_acknowledged, 3);

    drop(connection);
    assert_eq!(server.join().unwrap(), vec!["G21", "G90", "G0 X5"]);
}
