use std::sync::Arc;

use super::{DaemonName, LogTarget};
use crate::extract::log_targets_from_config;
use crate::kea_config::KeaConfig;
use crate::subnets::{local_subnet_id, local_subnets, IndexedSubnets, LocalSubnet};

/// A monitored daemon and the state derived from its configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Daemon {
    pub id: i64,
    pub app_id: i64,
    pub name: DaemonName,
    pub config: Option<Arc<KeaConfig>>,
    /// Hash of `config`, empty while no configuration has been received.
    pub config_hash: String,
    pub log_targets: Vec<LogTarget>,
    /// Subnet lookup index, built on demand and dropped on config change.
    pub subnet_index: Option<Arc<IndexedSubnets>>,
}

impl Daemon {
    pub fn new(id: i64, app_id: i64, name: DaemonName) -> Self {
        Self {
            id,
            app_id,
            name,
            config: None,
            config_hash: String::new(),
            log_targets: Vec::new(),
            subnet_index: None,
        }
    }

    /// Replace the configuration and rebuild the log targets from it.
    pub fn set_config(&mut self, config: Arc<KeaConfig>) {
        let targets = log_targets_from_config(self.id, &config);
        self.set_config_with_targets(config, targets);
    }

    /// Replace the configuration with log targets extracted beforehand.
    ///
    /// A new target matching a current one by logger name and output keeps
    /// the current identity and creation time. Each current target is handed
    /// over at most once.
    pub fn set_config_with_targets(&mut self, config: Arc<KeaConfig>, targets: Vec<LogTarget>) {
        let mut previous: Vec<Option<LogTarget>> =
            std::mem::take(&mut self.log_targets).into_iter().map(Some).collect();
        self.log_targets = targets
            .into_iter()
            .map(|mut target| {
                target.daemon_id = self.id;
                let matched = previous
                    .iter_mut()
                    .find(|slot| slot.as_ref().is_some_and(|old| old.same_target(&target)))
                    .and_then(Option::take);
                if let Some(old) = matched {
                    target.id = old.id;
                    target.created_at = old.created_at;
                }
                target
            })
            .collect();
        self.config_hash = config.hash().to_string();
        self.config = Some(config);
        self.subnet_index = None;
    }

    /// Build the subnet index for repeated [`Daemon::local_subnet_id`] calls.
    pub fn index_subnets(&mut self) {
        self.subnet_index = self
            .config
            .as_deref()
            .map(|config| Arc::new(IndexedSubnets::new(config)));
    }

    /// Local identifier of the subnet with `prefix`, using the index when it
    /// has been built.
    pub fn local_subnet_id(&self, prefix: &str) -> Option<i64> {
        if let Some(index) = &self.subnet_index {
            return index.get(prefix).and_then(|subnet| subnet.id);
        }
        local_subnet_id(self.config.as_deref()?, prefix)
    }

    /// Subnets served by this daemon, empty without a configuration.
    pub fn local_subnets(&self) -> Vec<LocalSubnet> {
        self.config
            .as_deref()
            .map(local_subnets)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::Daemon;
    use crate::kea_config::KeaConfig;
    use crate::model::{DaemonName, LogTarget};

    fn config(outputs: &[&str]) -> Arc<KeaConfig> {
        let options: Vec<String> = outputs
            .iter()
            .map(|o| format!(r#"{{"output": "{o}"}}"#))
            .collect();
        let text = format!(
            r#"{{"Dhcp4": {{"loggers": [{{"name": "kea-dhcp4", "severity": "INFO", "output_options": [{}]}}]}}}}"#,
            options.join(",")
        );
        Arc::new(KeaConfig::from_json(&text).expect("config"))
    }

    #[test]
    fn set_config_preserves_matching_log_target_identity() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("ts");
        let mut daemon = Daemon::new(3, 1, DaemonName::Dhcp4);
        daemon.log_targets = vec![LogTarget {
            id: Some(11),
            created_at: Some(created),
            ..LogTarget::new(3, "kea-dhcp4", "info", "/tmp/a.log")
        }];

        daemon.set_config(config(&["/tmp/a.log", "/tmp/b.log"]));

        assert_eq!(daemon.log_targets.len(), 2);
        assert_eq!(daemon.log_targets[0].id, Some(11));
        assert_eq!(daemon.log_targets[0].created_at, Some(created));
        assert_eq!(daemon.log_targets[1].id, None);
        assert_eq!(daemon.log_targets[1].daemon_id, 3);
        assert_eq!(
            daemon.config_hash,
            daemon.config.as_ref().expect("config").hash()
        );
    }

    #[test]
    fn local_subnet_lookup_with_and_without_index() {
        let with_subnets = KeaConfig::from_json(
            r#"{"Dhcp6": {"subnet6": [{"id": 12, "subnet": "2001:db8:2::/64"}]}}"#,
        )
        .expect("config");
        let mut daemon = Daemon::new(1, 1, DaemonName::Dhcp6);
        daemon.set_config(Arc::new(with_subnets));

        assert_eq!(daemon.local_subnet_id("2001:0db8:0002:0000::/64"), Some(12));
        daemon.index_subnets();
        assert!(daemon.subnet_index.is_some());
        assert_eq!(daemon.local_subnet_id("2001:db8:2::/64"), Some(12));
        assert_eq!(daemon.local_subnet_id("2001:db8:3::/64"), None);
        assert_eq!(daemon.local_subnets().len(), 1);

        daemon.set_config(config(&[]));
        assert!(daemon.subnet_index.is_none());
        assert_eq!(daemon.local_subnet_id("2001:db8:2::/64"), None);
    }

    #[test]
    fn identity_is_handed_over_once() {
        let mut daemon = Daemon::new(3, 1, DaemonName::Dhcp4);
        daemon.log_targets = vec![LogTarget {
            id: Some(11),
            ..LogTarget::new(3, "kea-dhcp4", "info", "/tmp/a.log")
        }];

        daemon.set_config(config(&["/tmp/a.log", "/tmp/a.log"]));

        let ids: Vec<_> = daemon.log_targets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(11), None]);
    }
}
