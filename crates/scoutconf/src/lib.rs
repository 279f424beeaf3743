//! Configuration loading for auscout.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/auscout/config.toml` (system)
//! 2. `~/.config/auscout/config.toml` (user)
//! 3. `./auscout.toml` or the `--config` path (local override)
//! 4. Environment variables (`AUSCOUT_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [client]
//! server = "tcp://index.local:4005"
//! sample_rate = 6000
//! seconds = 30.0
//! toggles = 2
//! extensions = ["mp3", "flac"]
//!
//! [telemetry]
//! log_level = "debug"
//! ```

pub mod client;
pub mod loader;
pub mod telemetry;

pub use client::ClientConfig;
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use telemetry::TelemetryConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Complete auscout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoutConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ScoutConfig {
    /// Load configuration with an optional explicit file, then apply env overrides.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    pub(crate) fn deserialize_table(table: toml::Table) -> Result<Self, String> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| e.to_string())
    }

    /// Serialize config to a TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("# auscout configuration\n\n{}", body))
    }
}
