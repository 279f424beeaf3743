//! Client configuration - where to send fingerprints and how to compute them.

use serde::{Deserialize, Serialize};

/// Settings for one batch run against an auscoutd server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// ZMQ endpoint of the index server.
    /// Default: tcp://localhost:4005
    pub server: String,

    /// Target sample rate the decoder resamples to, in Hz.
    /// Default: 6000
    pub sample_rate: u32,

    /// Seconds sampled from the start of each file (0 = whole file).
    /// Default: 0
    pub seconds: f32,

    /// Toggle vector width P (number of sensitive bits reported per frame).
    /// Default: 0
    pub toggles: u32,

    /// Append per-frame toggle vectors to query messages.
    /// Default: false
    pub send_toggles: bool,

    /// Pause between files in milliseconds.
    /// Default: 0
    pub pause_ms: u64,

    /// Send timeout for the request socket in milliseconds.
    /// Default: 5000
    pub send_timeout_ms: u64,

    /// File extensions treated as audio (case-insensitive, no dot).
    pub extensions: Vec<String>,
}

impl ClientConfig {
    pub const DEFAULT_SERVER: &'static str = "tcp://localhost:4005";
    pub const DEFAULT_SAMPLE_RATE: u32 = 6000;
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: Self::DEFAULT_SERVER.to_string(),
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
            seconds: 0.0,
            toggles: 0,
            send_toggles: false,
            pause_ms: 0,
            send_timeout_ms: 5000,
            extensions: ["mp3", "wav", "flac", "ogg", "m4a", "aac", "aif", "aiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
