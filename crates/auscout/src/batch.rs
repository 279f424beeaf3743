//! Batch processing: one outcome per discovered file.
//!
//! Files are handled strictly one after another over a single index
//! connection. File-local problems (decode, hashing, encoding, malformed
//! replies) become outcome data and the batch moves on. A transport failure
//! ends the batch: the current file fails, the rest are skipped, and the
//! report records why.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scoutconf::ClientConfig;
use scoutproto::{
    ClientError, Command, IndexClient, ProtocolError, Reply, Transport, TransportError,
    WireMessage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::decode::AudioDecoder;
use crate::discovery::{discover_audio_files, DiscoveryError};
use crate::hash::Fingerprinter;

pub const SKIP_NO_FRAMES: &str = "no hash frames";
pub const SKIP_ABORTED: &str = "batch aborted";

/// Inputs for one batch run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub root: PathBuf,
    pub command: Command,
    pub server: String,
    /// Seconds sampled per file, 0 for the whole file
    pub seconds: f32,
    pub sample_rate: u32,
    /// Toggle width P
    pub toggles: u32,
    /// Append toggle frames to queries
    pub send_toggles: bool,
    pub extensions: Vec<String>,
    /// Sleep between files
    pub pause: Duration,
    pub send_timeout: Duration,
}

impl BatchConfig {
    pub fn from_client_config(
        command: Command,
        root: impl Into<PathBuf>,
        client: &ClientConfig,
    ) -> Self {
        Self {
            root: root.into(),
            command,
            server: client.server.clone(),
            seconds: client.seconds,
            sample_rate: client.sample_rate,
            toggles: client.toggles,
            send_toggles: client.send_toggles,
            extensions: client.extensions.clone(),
            pause: Duration::from_millis(client.pause_ms),
            send_timeout: Duration::from_millis(client.send_timeout_ms),
        }
    }
}

/// Which stage a file failed in, with the underlying message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    Decode(String),
    Fingerprint(String),
    Format(String),
    Transport(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Decode(m) => write!(f, "decode: {}", m),
            FailureReason::Fingerprint(m) => write!(f, "fingerprint: {}", m),
            FailureReason::Format(m) => write!(f, "format: {}", m),
            FailureReason::Transport(m) => write!(f, "transport: {}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FileOutcome {
    Success(Reply),
    Skipped(String),
    Failed(FailureReason),
    /// A submission went unanswered; the server may or may not have stored it
    AmbiguousTimeout,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success(_))
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Success(reply) => write!(f, "{}", reply),
            FileOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            FileOutcome::Failed(reason) => write!(f, "failed ({})", reason),
            FileOutcome::AmbiguousTimeout => write!(f, "no reply (outcome unknown)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Per-kind outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} ok, {} failed, {} skipped, {} unanswered",
            self.total, self.succeeded, self.failed, self.skipped, self.timed_out
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub command: Command,
    pub outcomes: Vec<FileReport>,
    /// Set when a transport failure ended the batch early
    pub aborted: Option<String>,
}

impl BatchReport {
    pub fn completed(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for report in &self.outcomes {
            match report.outcome {
                FileOutcome::Success(_) => summary.succeeded += 1,
                FileOutcome::Skipped(_) => summary.skipped += 1,
                FileOutcome::Failed(_) => summary.failed += 1,
                FileOutcome::AmbiguousTimeout => summary.timed_out += 1,
            }
        }
        summary
    }
}

/// Reasons a batch could not start
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Connect(#[from] TransportError),
}

/// Result of one file that did not end the batch, or the reason it did
enum Step {
    Done(FileOutcome),
    Abort(String),
}

pub struct BatchRunner<D, F> {
    config: BatchConfig,
    decoder: D,
    hasher: F,
}

impl<D: AudioDecoder, F: Fingerprinter> BatchRunner<D, F> {
    pub fn new(config: BatchConfig, decoder: D, hasher: F) -> Self {
        Self {
            config,
            decoder,
            hasher,
        }
    }

    /// Enumerate the root, connect with `connect`, and process every file.
    ///
    /// An unreadable root fails before any connection is attempted.
    pub fn run_dir<T, C>(&self, connect: C) -> Result<BatchReport, BatchError>
    where
        T: Transport,
        C: FnOnce(&BatchConfig) -> Result<T, TransportError>,
    {
        let files = discover_audio_files(&self.config.root, &self.config.extensions)?;
        let transport = connect(&self.config)?;
        Ok(self.run(files, IndexClient::new(transport)))
    }

    /// Process `files` in order over `client`.
    ///
    /// The client and the hashing context are dropped before this returns,
    /// whichever way the batch ends.
    pub fn run<T: Transport>(
        &self,
        files: Vec<PathBuf>,
        mut client: IndexClient<T>,
    ) -> BatchReport {
        let command = self.config.command;
        info!(
            "Starting {} batch: {} files from {}",
            command.as_str(),
            files.len(),
            self.config.root.display()
        );

        let mut context = F::Context::default();
        let mut outcomes = Vec::with_capacity(files.len());
        let mut aborted = None;
        let mut remaining = files.into_iter().peekable();

        while let Some(path) = remaining.next() {
            match self.process_file(&path, &mut client, &mut context) {
                Step::Done(outcome) => {
                    log_outcome(&path, &outcome);
                    outcomes.push(FileReport { path, outcome });
                }
                Step::Abort(reason) => {
                    error!("Aborting batch at {}: {}", path.display(), reason);
                    outcomes.push(FileReport {
                        path,
                        outcome: FileOutcome::Failed(FailureReason::Transport(reason.clone())),
                    });
                    aborted = Some(reason);
                    break;
                }
            }

            if !self.config.pause.is_zero() && remaining.peek().is_some() {
                std::thread::sleep(self.config.pause);
            }
        }

        outcomes.extend(remaining.map(|path| FileReport {
            path,
            outcome: FileOutcome::Skipped(SKIP_ABORTED.to_string()),
        }));

        let stats = client.stats();
        drop(client);
        drop(context);

        let report = BatchReport {
            command,
            outcomes,
            aborted,
        };
        info!(
            "Finished {} batch: {} ({} requests, {} timeouts)",
            command.as_str(),
            report.summary(),
            stats.sent,
            stats.timeouts
        );
        report
    }

    fn process_file<T: Transport>(
        &self,
        path: &Path,
        client: &mut IndexClient<T>,
        context: &mut F::Context,
    ) -> Step {
        info!("Processing {}", path.display());

        let audio = match self
            .decoder
            .decode(path, self.config.sample_rate, self.config.seconds)
        {
            Ok(audio) => audio,
            Err(e) => return Step::Done(FileOutcome::Failed(FailureReason::Decode(e.to_string()))),
        };
        debug!(
            "Decoded {:.1}s at {} Hz",
            audio.duration_seconds(),
            audio.sample_rate
        );

        let fingerprint = match self.hasher.fingerprint(
            &audio.samples,
            audio.sample_rate,
            self.config.toggles,
            context,
        ) {
            Ok(fp) => fp,
            Err(e) => {
                return Step::Done(FileOutcome::Failed(FailureReason::Fingerprint(
                    e.to_string(),
                )))
            }
        };
        if fingerprint.is_empty() {
            return Step::Done(FileOutcome::Skipped(SKIP_NO_FRAMES.to_string()));
        }

        let message = match self.config.command {
            Command::Query if self.config.send_toggles => {
                WireMessage::query_with_toggles(&fingerprint)
            }
            Command::Query => WireMessage::query(&fingerprint),
            Command::Submit => {
                debug!("Submitting with metadata:\n{}", audio.metadata);
                WireMessage::submit(&fingerprint, &audio.metadata)
            }
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => return Step::Done(FileOutcome::Failed(FailureReason::Format(e.to_string()))),
        };
        debug!(
            "{} frames, {} bytes on the wire",
            fingerprint.frame_count(),
            message.byte_len()
        );

        match client.exchange(&message) {
            Ok(Some(reply)) => Step::Done(FileOutcome::Success(reply)),
            Ok(None) => Step::Done(FileOutcome::AmbiguousTimeout),
            Err(ClientError::Protocol(e)) => Step::Done(malformed_reply(e)),
            Err(e) => Step::Abort(e.to_string()),
        }
    }
}

fn malformed_reply(e: ProtocolError) -> FileOutcome {
    FileOutcome::Failed(FailureReason::Format(e.to_string()))
}

fn log_outcome(path: &Path, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Success(reply) => info!("{}: {}", path.display(), reply),
        FileOutcome::Skipped(reason) => info!("{}: skipped ({})", path.display(), reason),
        FileOutcome::Failed(reason) => warn!("{}: {}", path.display(), reason),
        FileOutcome::AmbiguousTimeout => warn!("{}: no reply before timeout", path.display()),
    }
}
