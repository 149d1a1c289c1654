use config_tree_core::ConfigNode;
use serde::Serialize;
use tracing::debug;

use crate::kea_config::KeaConfig;
use crate::model::{Daemon, DaemonName, HaRole};

/// A peer declared in the HA hook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaPeer {
    pub name: String,
    pub url: String,
    pub role: HaRole,
}

/// What one daemon's configuration says about its HA relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaPeerFact {
    pub ha_type: DaemonName,
    pub mode: String,
    pub this_server_name: String,
    pub this_server_role: HaRole,
    /// All declared peers, this server included.
    pub peers: Vec<HaPeer>,
}

impl HaPeerFact {
    /// Declared peers other than this server.
    pub fn other_peers(&self) -> impl Iterator<Item = &HaPeer> {
        self.peers
            .iter()
            .filter(move |peer| peer.name != self.this_server_name)
    }

    pub fn this_server(&self) -> Option<&HaPeer> {
        self.peers
            .iter()
            .find(|peer| peer.name == self.this_server_name)
    }
}

/// HA fact of a daemon, `None` when it has no usable HA configuration.
pub fn extract_ha_peer_fact(daemon: &Daemon) -> Option<HaPeerFact> {
    let config = daemon.config.as_deref()?;
    ha_peer_fact_from_config(daemon.name, config)
}

/// HA fact carried by a configuration of the given daemon kind.
///
/// The fact is read from the `high-availability` parameters of the HA hook
/// library. When several relationships are listed only the first one is
/// used. Peers lacking a name, URL or known role are skipped; the fact is
/// dropped entirely when this server is not among the remaining peers.
pub fn ha_peer_fact_from_config(name: DaemonName, config: &KeaConfig) -> Option<HaPeerFact> {
    if !name.supports_ha() {
        return None;
    }
    let (library, parameters) = config.ha_hook_library()?;
    let relationship = match parameters?.get("high-availability")? {
        ConfigNode::List(items) => items.first()?,
        node @ ConfigNode::Map(_) => node,
        other => {
            debug!(library, kind = other.kind(), "ignoring unexpected high-availability value");
            return None;
        }
    };

    let this_server_name = relationship.get_str(&["this-server-name"])?.to_string();
    let mode = relationship.get_str(&["mode"])?.to_string();
    let peers: Vec<HaPeer> = relationship
        .items(&["peers"])
        .iter()
        .filter_map(parse_peer)
        .collect();

    let this_server_role = peers
        .iter()
        .find(|peer| peer.name == this_server_name)
        .map(|peer| peer.role)?;

    Some(HaPeerFact {
        ha_type: name,
        mode,
        this_server_name,
        this_server_role,
        peers,
    })
}

fn parse_peer(node: &ConfigNode) -> Option<HaPeer> {
    let name = node.get_str(&["name"])?;
    let url = node.get_str(&["url"])?;
    let role = match node.get_str(&["role"])?.parse::<HaRole>() {
        Ok(role) => role,
        Err(reason) => {
            debug!(peer = name, %reason, "skipping HA peer");
            return None;
        }
    };
    Some(HaPeer {
        name: name.to_string(),
        url: url.to_string(),
        role,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{extract_ha_peer_fact, ha_peer_fact_from_config, HaPeer};
    use crate::kea_config::KeaConfig;
    use crate::model::{Daemon, DaemonName, HaRole};

    fn ha_config(root: &str, relationship: &str) -> KeaConfig {
        let text = format!(
            r#"{{"{root}": {{"hooks-libraries": [
                {{"library": "/usr/lib/kea/hooks/libdhcp_lease_cmds.so"}},
                {{"library": "/usr/lib/kea/hooks/libdhcp_ha.so",
                  "parameters": {{"high-availability": {relationship}}}}}
            ]}}}}"#
        );
        KeaConfig::from_json(&text).expect("config")
    }

    const RELATIONSHIP: &str = r#"[{
        "this-server-name": "server3",
        "mode": "hot-standby",
        "peers": [
            {"name": "server1", "url": "http://192.0.2.33:8000", "role": "primary"},
            {"name": "server3", "url": "http://192.0.2.66:8000", "role": "standby"},
            {"name": "server5", "url": "http://192.0.2.166:8000", "role": "backup"}
        ]
    }]"#;

    #[test]
    fn extracts_peers_and_own_role() {
        let fact = ha_peer_fact_from_config(DaemonName::Dhcp6, &ha_config("Dhcp6", RELATIONSHIP))
            .expect("fact");

        assert_eq!(fact.ha_type, DaemonName::Dhcp6);
        assert_eq!(fact.mode, "hot-standby");
        assert_eq!(fact.this_server_role, HaRole::Standby);
        assert_eq!(fact.peers.len(), 3);
        let others: Vec<&str> = fact.other_peers().map(|p| p.name.as_str()).collect();
        assert_eq!(others, vec!["server1", "server5"]);
        assert_eq!(
            fact.this_server(),
            Some(&HaPeer {
                name: "server3".to_string(),
                url: "http://192.0.2.66:8000".to_string(),
                role: HaRole::Standby,
            })
        );
    }

    #[test]
    fn accepts_single_relationship_map() {
        let single = RELATIONSHIP.trim().trim_start_matches('[').trim_end_matches(']');
        let fact = ha_peer_fact_from_config(DaemonName::Dhcp4, &ha_config("Dhcp4", single))
            .expect("fact");
        assert_eq!(fact.this_server_name, "server3");
    }

    #[test]
    fn missing_pieces_yield_no_fact() {
        let no_hook = KeaConfig::from_json(r#"{"Dhcp4": {"hooks-libraries": []}}"#).expect("cfg");
        assert_eq!(ha_peer_fact_from_config(DaemonName::Dhcp4, &no_hook), None);

        let no_params = KeaConfig::from_json(
            r#"{"Dhcp4": {"hooks-libraries": [{"library": "libdhcp_ha.so"}]}}"#,
        )
        .expect("cfg");
        assert_eq!(ha_peer_fact_from_config(DaemonName::Dhcp4, &no_params), None);

        let not_a_peer = ha_config(
            "Dhcp4",
            r#"[{"this-server-name": "server9", "mode": "load-balancing", "peers": [
                {"name": "server1", "url": "http://192.0.2.33:8000", "role": "primary"}
            ]}]"#,
        );
        assert_eq!(ha_peer_fact_from_config(DaemonName::Dhcp4, &not_a_peer), None);

        let garbage = ha_config("Dhcp4", "42");
        assert_eq!(ha_peer_fact_from_config(DaemonName::Dhcp4, &garbage), None);
    }

    #[test]
    fn malformed_peers_are_skipped() {
        let config = ha_config(
            "Dhcp4",
            r#"[{"this-server-name": "server1", "mode": "load-balancing", "peers": [
                {"name": "server1", "url": "http://192.0.2.33:8000", "role": "primary"},
                {"name": "server2", "role": "secondary"},
                {"name": "server3", "url": "http://192.0.2.99:8000", "role": "observer"},
                "junk"
            ]}]"#,
        );
        let fact = ha_peer_fact_from_config(DaemonName::Dhcp4, &config).expect("fact");
        assert_eq!(fact.peers.len(), 1);
        assert_eq!(fact.other_peers().count(), 0);
    }

    #[test]
    fn named_daemons_and_unconfigured_daemons_have_no_fact() {
        let config = Arc::new(ha_config("Dhcp4", RELATIONSHIP));
        assert_eq!(ha_peer_fact_from_config(DaemonName::Named, &config), None);

        let mut daemon = Daemon::new(1, 1, DaemonName::Dhcp4);
        assert_eq!(extract_ha_peer_fact(&daemon), None);
        daemon.set_config(config);
        assert!(extract_ha_peer_fact(&daemon).is_some());
    }
}
