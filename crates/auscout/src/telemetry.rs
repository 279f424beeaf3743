//! Logging setup for the auscout binary.

use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber filtered at `level`.
///
/// `level` is any `EnvFilter` directive string ("debug", "auscout=trace,info").
/// Stdout is left to the batch report.
pub fn init(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {:?} ({}), using info", level, e);
        EnvFilter::new("info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
