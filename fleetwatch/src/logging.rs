use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output format of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Subscriber settings, read from the `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `fleetwatch=debug,warn`.
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
            with_target: false,
            ansi: true,
        }
    }
}

/// Errors returned when installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{level}': {source}")]
    Filter {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Install the global subscriber. Events go to stderr so command output on
/// stdout stays machine readable.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|source| LoggingError::Filter {
        level: config.level.clone(),
        source,
    })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{init_tracing, LogFormat, LoggingConfig, LoggingError};

    #[test]
    fn bad_filter_is_reported() {
        let config = LoggingConfig {
            level: "fleetwatch=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_tracing(&config),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn format_parses_from_toml() {
        let config: LoggingConfig = toml::from_str("format = \"json\"\nlevel = \"debug\"")
            .expect("parse");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
        assert!(config.ansi);
    }
}
