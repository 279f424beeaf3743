//! Whole-pipeline batches: WAV fixtures on disk, real decoder and hasher,
//! and a REP socket standing in for the index server.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use auscout::batch::{BatchConfig, BatchError, BatchRunner, FailureReason, FileOutcome, SKIP_ABORTED};
use auscout::{BarkHasher, FileDecoder};
use bytes::Bytes;
use scoutconf::ClientConfig;
use scoutproto::{Command, MetadataRecord, Reply, Transport, TransportError, ZmqTransport};
use tempfile::TempDir;

static PORT: AtomicU16 = AtomicU16::new(17680);

fn next_endpoint() -> String {
    let port = PORT.fetch_add(1, Ordering::SeqCst);
    format!("tcp://127.0.0.1:{}", port)
}

/// Two seconds of a rising tone at 6 kHz, enough for a few hundred hashes.
fn write_wav(path: &Path, freq: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 6000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..12000 {
        let t = i as f32 / 6000.0;
        let v = (2.0 * std::f32::consts::PI * (freq + 300.0 * t) * t).sin();
        writer.write_sample((v * 12000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn batch_config(command: Command, root: &Path, endpoint: &str) -> BatchConfig {
    let client = ClientConfig {
        server: endpoint.to_string(),
        ..Default::default()
    };
    BatchConfig::from_client_config(command, root, &client)
}

/// REP server answering `count` requests through `respond`, returning what it saw.
fn spawn_server<F>(endpoint: &str, count: usize, respond: F) -> thread::JoinHandle<Vec<Vec<Vec<u8>>>>
where
    F: Fn(usize) -> Option<Vec<u8>> + Send + 'static,
{
    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::REP).unwrap();
    socket.set_linger(0).unwrap();
    socket.bind(endpoint).unwrap();

    thread::spawn(move || {
        let _ctx = ctx;
        let mut seen = Vec::new();
        for i in 0..count {
            seen.push(socket.recv_multipart(0).unwrap());
            match respond(i) {
                Some(reply) => socket.send(reply, 0).unwrap(),
                // Never answer; the client must give up on its own
                None => break,
            }
        }
        seen
    })
}

fn outcome_for<'a>(report: &'a auscout::BatchReport, name: &str) -> &'a FileOutcome {
    &report
        .outcomes
        .iter()
        .find(|r| r.path.file_name().and_then(|n| n.to_str()) == Some(name))
        .unwrap()
        .outcome
}

#[test]
fn query_batch_isolates_undecodable_file() {
    let dir = TempDir::new().unwrap();
    write_wav(&dir.path().join("one.wav"), 220.0);
    std::fs::write(dir.path().join("broken.wav"), b"this is not a wave file").unwrap();
    write_wav(&dir.path().join("three.WAV"), 330.0);
    std::fs::write(dir.path().join("cover.jpg"), b"jpeg").unwrap();

    let endpoint = next_endpoint();
    let server = spawn_server(&endpoint, 2, |i| Some(format!("match {}\0", i).into_bytes()));

    let runner = BatchRunner::new(
        batch_config(Command::Query, dir.path(), &endpoint),
        FileDecoder::new(),
        BarkHasher::new(),
    );
    let report = runner
        .run_dir(|cfg| ZmqTransport::connect(&cfg.server))
        .unwrap();

    assert!(report.completed());
    assert_eq!(report.outcomes.len(), 3);
    assert!(matches!(
        outcome_for(&report, "broken.wav"),
        FileOutcome::Failed(FailureReason::Decode(_))
    ));
    for name in ["one.wav", "three.WAV"] {
        match outcome_for(&report, name) {
            FileOutcome::Success(Reply::Matched { text }) => assert!(text.starts_with("match ")),
            other => panic!("{}: unexpected outcome {:?}", name, other),
        }
    }

    for request in server.join().unwrap() {
        assert_eq!(request.len(), 3);
        assert_eq!(request[0], vec![0x01]);
        let count = u32::from_le_bytes(request[1].clone().try_into().unwrap());
        assert!(count > 0);
        assert_eq!(request[2].len(), count as usize * 4);
    }
}

#[test]
fn query_with_toggles_sends_toggle_frames() {
    let dir = TempDir::new().unwrap();
    write_wav(&dir.path().join("tone.wav"), 440.0);

    let endpoint = next_endpoint();
    let server = spawn_server(&endpoint, 1, |_| Some(b"none".to_vec()));

    let mut config = batch_config(Command::Query, dir.path(), &endpoint);
    config.toggles = 3;
    config.send_toggles = true;
    let runner = BatchRunner::new(config, FileDecoder::new(), BarkHasher::new());
    let report = runner
        .run_dir(|cfg| ZmqTransport::connect(&cfg.server))
        .unwrap();
    assert!(report.outcomes[0].outcome.is_success());

    let request = &server.join().unwrap()[0];
    let count = u32::from_le_bytes(request[1].clone().try_into().unwrap()) as usize;
    assert_eq!(request[3], vec![3]);
    assert_eq!(request.len(), 4 + count);
    assert!(request[4..].iter().all(|t| t.len() == 3));
}

#[test]
fn submit_sends_metadata_and_records_timeout_as_ambiguous() {
    let dir = TempDir::new().unwrap();
    write_wav(&dir.path().join("take.wav"), 500.0);

    let endpoint = next_endpoint();
    let server = spawn_server(&endpoint, 1, |_| None);

    let runner = BatchRunner::new(
        batch_config(Command::Submit, dir.path(), &endpoint),
        FileDecoder::new(),
        BarkHasher::new(),
    );
    let report = runner
        .run_dir(|cfg| ZmqTransport::connect(&cfg.server))
        .unwrap();

    assert!(report.completed());
    assert_eq!(report.outcomes[0].outcome, FileOutcome::AmbiguousTimeout);

    let request = &server.join().unwrap()[0];
    assert_eq!(request[0], vec![0x02]);
    let metadata = MetadataRecord::from_wire_bytes(&request[3]).unwrap();
    // WAV carries no tags; duration comes from the decoded length
    assert_eq!(metadata.duration, 2);
    assert_eq!(metadata.composer, None);
}

/// Transport whose channel is already gone.
struct Dead;

impl Transport for Dead {
    fn send_parts(&mut self, _: &[Bytes]) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn recv_parts(&mut self, _: Duration) -> Result<Option<Vec<Bytes>>, TransportError> {
        Err(TransportError::Closed)
    }
}

#[test]
fn transport_loss_aborts_remaining_files() {
    let dir = TempDir::new().unwrap();
    for name in ["a.wav", "b.wav", "c.wav"] {
        write_wav(&dir.path().join(name), 300.0);
    }

    let runner = BatchRunner::new(
        batch_config(Command::Query, dir.path(), "inproc://unused"),
        FileDecoder::new(),
        BarkHasher::new(),
    );
    let report = runner.run_dir(|_| Ok(Dead)).unwrap();

    assert!(!report.completed());
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.outcomes[0].outcome,
        FileOutcome::Failed(FailureReason::Transport("Channel closed".to_string()))
    );
    for rest in &report.outcomes[1..] {
        assert_eq!(rest.outcome, FileOutcome::Skipped(SKIP_ABORTED.to_string()));
    }
}

#[test]
fn unreadable_root_fails_before_connecting() {
    let dir = TempDir::new().unwrap();
    let missing: PathBuf = dir.path().join("nowhere");

    let runner = BatchRunner::new(
        batch_config(Command::Query, &missing, "inproc://unused"),
        FileDecoder::new(),
        BarkHasher::new(),
    );
    let result = runner.run_dir(|_| -> Result<Dead, TransportError> {
        panic!("connect must not be attempted")
    });
    assert!(matches!(result, Err(BatchError::Discovery(_))));
}
