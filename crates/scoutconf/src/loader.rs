//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ScoutConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, in load order (system, user,
/// local). Only returns files that exist.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/auscout/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("auscout/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("auscout.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a config, filling unset fields with defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<ScoutConfig, ConfigError> {
    ScoutConfig::deserialize_table(table).map_err(|message| ConfigError::Parse {
        path: origin.to_path_buf(),
        message,
    })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ScoutConfig, sources: &mut ConfigSources) {
    apply_overrides_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides using an arbitrary variable lookup.
///
/// Values that fail to parse are ignored, leaving the file value in place.
pub fn apply_overrides_with<F>(config: &mut ScoutConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("AUSCOUT_SERVER") {
        config.client.server = v;
        sources.env_overrides.push("AUSCOUT_SERVER".to_string());
    }
    if let Some(rate) = lookup("AUSCOUT_SAMPLE_RATE").and_then(|v| v.parse().ok()) {
        config.client.sample_rate = rate;
        sources.env_overrides.push("AUSCOUT_SAMPLE_RATE".to_string());
    }
    if let Some(p) = lookup("AUSCOUT_TOGGLES").and_then(|v| v.parse().ok()) {
        config.client.toggles = p;
        sources.env_overrides.push("AUSCOUT_TOGGLES".to_string());
    }
    if let Some(secs) = lookup("AUSCOUT_SECONDS")
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
    {
        config.client.seconds = secs;
        sources.env_overrides.push("AUSCOUT_SECONDS".to_string());
    }
    if let Some(ms) = lookup("AUSCOUT_SEND_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.client.send_timeout_ms = ms;
        sources.env_overrides.push("AUSCOUT_SEND_TIMEOUT_MS".to_string());
    }
    if let Some(v) = lookup("AUSCOUT_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("AUSCOUT_LOG_LEVEL".to_string());
    }
    // RUST_LOG wins over everything
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn table(s: &str) -> toml::Table {
        parse_table(s, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_cli_override_path_is_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[client]\ntoggles = 3\n").unwrap();

        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = from_table(
            table("[client]\nserver = \"tcp://10.0.0.2:4005\"\n"),
            Path::new("test.toml"),
        )
        .unwrap();

        assert_eq!(config.client.server, "tcp://10.0.0.2:4005");
        // Other values should be defaults
        assert_eq!(config.client.sample_rate, 6000);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_merge_later_file_wins_per_key() {
        let mut base = table(
            r#"
[client]
server = "tcp://system:4005"
toggles = 2

[telemetry]
log_level = "warn"
"#,
        );
        merge_tables(&mut base, table("[client]\ntoggles = 4\n"));

        let config = from_table(base, Path::new("merged")).unwrap();
        assert_eq!(config.client.server, "tcp://system:4005");
        assert_eq!(config.client.toggles, 4);
        assert_eq!(config.telemetry.log_level, "warn");
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = from_table(table("[client]\nsample_rate = \"fast\"\n"), Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AUSCOUT_SERVER", "tcp://index:5000"),
            ("AUSCOUT_TOGGLES", "5"),
            ("AUSCOUT_SAMPLE_RATE", "not-a-number"),
            ("RUST_LOG", "auscout=debug"),
        ]
        .into_iter()
        .collect();

        let mut config = ScoutConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_with(&mut config, &mut sources, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.client.server, "tcp://index:5000");
        assert_eq!(config.client.toggles, 5);
        assert_eq!(config.client.sample_rate, 6000);
        assert_eq!(config.telemetry.log_level, "auscout=debug");
        assert_eq!(
            sources.env_overrides,
            vec!["AUSCOUT_SERVER", "AUSCOUT_TOGGLES", "RUST_LOG"]
        );
    }

    #[test]
    fn test_env_seconds_must_be_finite_and_non_negative() {
        let mut config = ScoutConfig::default();
        let mut sources = ConfigSources::default();
        for bad in ["-1", "NaN", "inf"] {
            apply_overrides_with(&mut config, &mut sources, |k| {
                (k == "AUSCOUT_SECONDS").then(|| bad.to_string())
            });
        }
        assert_eq!(config.client.seconds, ScoutConfig::default().client.seconds);
        assert!(sources.env_overrides.is_empty());

        apply_overrides_with(&mut config, &mut sources, |k| {
            (k == "AUSCOUT_SECONDS").then(|| "2.5".to_string())
        });
        assert_eq!(config.client.seconds, 2.5);
    }
}
