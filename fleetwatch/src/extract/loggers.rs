use config_tree_core::ConfigNode;

use crate::kea_config::KeaConfig;
use crate::model::{Daemon, LogTarget};

/// Log targets of a daemon's current configuration, without persisted ids.
pub fn extract_log_targets(daemon: &Daemon) -> Vec<LogTarget> {
    daemon
        .config
        .as_deref()
        .map(|config| log_targets_from_config(daemon.id, config))
        .unwrap_or_default()
}

/// One target per output of every logger in the configuration, in
/// declaration order.
///
/// Both `output_options` and `output-options` spellings are read. Outputs
/// without an `output` string are skipped. Severity is stored lower case and
/// defaults to `info`.
pub fn log_targets_from_config(daemon_id: i64, config: &KeaConfig) -> Vec<LogTarget> {
    let mut targets = Vec::new();
    for logger in config.loggers() {
        let name = logger.get_str(&["name"]).unwrap_or_default();
        let severity = logger
            .get_str(&["severity"])
            .unwrap_or("info")
            .to_ascii_lowercase();
        for option in output_options(logger) {
            let Some(output) = option.get_str(&["output"]).filter(|o| !o.trim().is_empty()) else {
                continue;
            };
            targets.push(LogTarget::new(daemon_id, name, severity.clone(), output.trim()));
        }
    }
    targets
}

fn output_options(logger: &ConfigNode) -> &[ConfigNode] {
    let options = logger.items(&["output_options"]);
    if options.is_empty() {
        logger.items(&["output-options"])
    } else {
        options
    }
}
