use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::extract::log_targets_from_config;
use crate::kea_config::KeaConfig;
use crate::model::LogTarget;

/// True when a logger output names a file rather than a stream or syslog.
/// Only absolute paths count; a relative output depends on the daemon's
/// working directory and cannot be resolved here.
pub fn is_file_output(output: &str) -> bool {
    let output = output.trim();
    if output == "stdout" || output == "stderr" || output.starts_with("syslog") {
        return false;
    }
    Path::new(output).is_absolute()
}

/// Files a daemon's loggers write to, and therefore the only files that may
/// be tailed on its behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogAllowList {
    paths: BTreeSet<String>,
}

impl LogAllowList {
    pub fn from_targets<'a>(targets: impl IntoIterator<Item = &'a LogTarget>) -> Self {
        Self {
            paths: targets
                .into_iter()
                .filter(|target| target.writes_to_file())
                .map(|target| target.output.trim().to_string())
                .collect(),
        }
    }

    pub fn from_config(config: &KeaConfig) -> Self {
        Self::from_targets(&log_targets_from_config(0, config))
    }

    /// Exact path match; no normalization or prefix matching is applied.
    pub fn allowed(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Current allow-list of every daemon, shared between the refresh path and
/// readers serving log requests.
///
/// Lists are swapped whole, so a reader sees either the previous or the new
/// list of a daemon and never a mix.
#[derive(Debug, Default)]
pub struct LogAccessRegistry {
    lists: RwLock<HashMap<i64, Arc<LogAllowList>>>,
}

impl LogAccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, daemon_id: i64, list: Arc<LogAllowList>) {
        debug!(daemon_id, paths = list.len(), "replacing log allow-list");
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(daemon_id, list);
    }

    pub fn remove(&self, daemon_id: i64) {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&daemon_id);
    }

    pub fn get(&self, daemon_id: i64) -> Option<Arc<LogAllowList>> {
        self.lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&daemon_id)
            .cloned()
    }

    /// Unknown daemons have an empty allow-list.
    pub fn allowed(&self, daemon_id: i64, path: &str) -> bool {
        self.get(daemon_id)
            .map(|list| list.allowed(path))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{is_file_output, LogAccessRegistry, LogAllowList};
    use crate::kea_config::KeaConfig;

    fn agent_config() -> KeaConfig {
        KeaConfig::from_json(
            r#"{"Dhcp4": {"loggers": [
                {"name": "kea-dhcp4", "severity": "INFO", "output_options": [
                    {"output": "stdout"}, {"output": "/tmp/kea-dhcp4.log"}
                ]},
                {"name": "kea-dhcp4.allocation-engine", "output_options": [
                    {"output": "/tmp/kea-dhcp4-allocations.log"}, {"output": "syslog:1"}
                ]},
                {"name": "kea-dhcp4.packets", "output_options": [{"output": "stderr"}]}
            ]}}"#,
        )
        .expect("config")
    }

    #[test]
    fn only_file_outputs_are_allowed() {
        let list = LogAllowList::from_config(&agent_config());

        assert!(list.allowed("/tmp/kea-dhcp4.log"));
        assert!(list.allowed("/tmp/kea-dhcp4-allocations.log"));
        assert!(!list.allowed("stdout"));
        assert!(!list.allowed("stderr"));
        assert!(!list.allowed("syslog:1"));
        assert!(!list.allowed("/tmp/../tmp/kea-dhcp4.log"));
        assert!(!list.allowed("/etc/passwd"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn allows_exactly_the_logger_files() {
        let config = KeaConfig::from_json(
            r#"{"Dhcp4": {"loggers": [{"name": "kea-dhcp4", "output_options": [
                {"output": "/var/log/a.log"}, {"output": "stderr"},
                {"output": "/var/log/b.log"}, {"output": "syslog:1"}
            ]}]}}"#,
        )
        .expect("config");
        let list = LogAllowList::from_config(&config);

        assert!(list.allowed("/var/log/a.log"));
        assert!(list.allowed("/var/log/b.log"));
        assert!(!list.allowed("stderr"));
        assert!(!list.allowed("syslog:1"));
        assert!(!list.allowed("/var/log/A.log"));
        assert_eq!(
            list.paths().collect::<Vec<_>>(),
            vec!["/var/log/a.log", "/var/log/b.log"]
        );
    }

    #[test]
    fn classifies_outputs() {
        assert!(is_file_output("/var/log/kea.log"));
        assert!(!is_file_output("kea.log"));
        assert!(!is_file_output("syslog"));
        assert!(!is_file_output("syslog:local7"));
        assert!(!is_file_output(" "));
    }

    #[test]
    fn registry_swaps_lists_per_daemon() {
        let registry = LogAccessRegistry::new();
        assert!(!registry.allowed(1, "/tmp/kea-dhcp4.log"));

        registry.replace(1, Arc::new(LogAllowList::from_config(&agent_config())));
        assert!(registry.allowed(1, "/tmp/kea-dhcp4.log"));
        assert!(!registry.allowed(2, "/tmp/kea-dhcp4.log"));

        let held = registry.get(1).expect("list");
        registry.replace(1, Arc::new(LogAllowList::default()));
        assert!(!registry.allowed(1, "/tmp/kea-dhcp4.log"));
        assert!(held.allowed("/tmp/kea-dhcp4.log"));

        registry.remove(1);
        assert!(registry.get(1).is_none());
    }
}
