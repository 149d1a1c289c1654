use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::store::StoreConfig;

/// Settings of the `fleetwatch` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Errors returned when loading a settings file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load settings from a TOML file. Missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<FleetConfig, ConfigLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&raw, path.display().to_string())
}

/// Built-in settings.
pub fn default_config() -> FleetConfig {
    let embedded = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/defaults/fleetwatch.toml"
    ));
    parse_config(embedded, "embedded defaults".to_string()).unwrap_or_default()
}

fn parse_config(raw: &str, path: String) -> Result<FleetConfig, ConfigLoadError> {
    toml::from_str(raw).map_err(|source| ConfigLoadError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{default_config, load_config, ConfigLoadError, FleetConfig};
    use crate::logging::LogFormat;

    #[test]
    fn embedded_defaults_match_code_defaults() {
        assert_eq!(default_config(), FleetConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fleetwatch.toml");
        fs::write(
            &path,
            "[store]\npath = \"/var/lib/fleetwatch/state.db\"\n\n[logging]\nformat = \"json\"\n",
        )
        .expect("write");

        let config = load_config(&path).expect("load");
        assert_eq!(
            config.store.path.to_str(),
            Some("/var/lib/fleetwatch/state.db")
        );
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn reports_parse_and_io_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[store\n").expect("write");
        assert!(matches!(load_config(&path), Err(ConfigLoadError::Parse { .. })));
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(ConfigLoadError::Io { .. })
        ));
    }
}
