//! auscout - fingerprint a directory of audio and talk to an Audio Scout index
//!
//! Subcommands:
//! - `auscout query <dir>` - look up every file in the index
//! - `auscout submit <dir>` - register every file with its tags
//! - `auscout config` - show the effective configuration

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use auscout::batch::{BatchConfig, BatchRunner};
use auscout::{report, BarkHasher, FileDecoder};
use clap::{Args, Parser, Subcommand};
use scoutconf::{ClientConfig, ScoutConfig};
use scoutproto::{Command, ZmqTransport};

mod telemetry;

#[derive(Parser)]
#[command(name = "auscout")]
#[command(about = "Audio Scout batch client: query or submit audio fingerprints")]
#[command(version)]
struct Cli {
    /// Config file to load instead of ./auscout.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up every audio file under DIR in the index
    Query {
        #[command(flatten)]
        batch: BatchArgs,

        /// Send per-frame toggle vectors with each query
        #[arg(long)]
        send_toggles: bool,
    },

    /// Register every audio file under DIR with the index
    Submit {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[derive(Args)]
struct BatchArgs {
    /// Directory to scan recursively
    dir: PathBuf,

    /// Index server endpoint (e.g., tcp://localhost:4005)
    #[arg(long)]
    server: Option<String>,

    /// Seconds sampled from the start of each file (0 = whole file)
    #[arg(short, long, value_parser = parse_seconds)]
    seconds: Option<f32>,

    /// Toggle width P, number of unreliable bits reported per frame
    #[arg(short = 'p', long)]
    toggles: Option<u32>,

    /// Pause between files in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Emit JSON lines instead of text
    #[arg(long)]
    json: bool,
}

fn parse_seconds(s: &str) -> Result<f32, String> {
    let seconds: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(format!("{s} is not a non-negative number of seconds"))
    }
}

impl BatchArgs {
    /// CLI flags win over configuration.
    fn apply(&self, client: &mut ClientConfig) {
        if let Some(server) = &self.server {
            client.server = server.clone();
        }
        if let Some(seconds) = self.seconds {
            client.seconds = seconds;
        }
        if let Some(toggles) = self.toggles {
            client.toggles = toggles;
        }
        if let Some(pause_ms) = self.pause_ms {
            client.pause_ms = pause_ms;
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (mut config, sources) = ScoutConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            let mut out = std::io::stdout().lock();
            for file in &sources.files {
                writeln!(out, "# loaded: {}", file.display())?;
            }
            for var in &sources.env_overrides {
                writeln!(out, "# env: {}", var)?;
            }
            write!(out, "{}", config.to_toml()?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Query {
            batch,
            send_toggles,
        } => {
            batch.apply(&mut config.client);
            config.client.send_toggles |= send_toggles;
            run_batch(Command::Query, &batch, &config)
        }
        Commands::Submit { batch } => {
            batch.apply(&mut config.client);
            run_batch(Command::Submit, &batch, &config)
        }
    }
}

fn run_batch(command: Command, args: &BatchArgs, config: &ScoutConfig) -> Result<ExitCode> {
    telemetry::init(&config.telemetry.log_level);

    let batch = BatchConfig::from_client_config(command, &args.dir, &config.client);
    let runner = BatchRunner::new(batch, FileDecoder::new(), BarkHasher::new());

    let report = runner
        .run_dir(|cfg| ZmqTransport::connect_with_timeout(&cfg.server, cfg.send_timeout))
        .with_context(|| format!("Could not start {} batch", command.as_str()))?;

    let mut out = std::io::stdout().lock();
    if args.json {
        report::write_json_lines(&mut out, &report)?;
    } else {
        report::write_text(&mut out, &report)?;
    }
    out.flush()?;

    Ok(if report.completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
