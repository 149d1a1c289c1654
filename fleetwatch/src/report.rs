use colored::Colorize;

use crate::extract::HaPeerFact;
use crate::log_allow::is_file_output;
use crate::model::{LogTarget, Service};
use crate::reconcile::RefreshOutcome;
use crate::subnets::LocalSubnet;

/// Render HA services with their role holders and members.
pub fn render_services(services: &[Service]) -> String {
    if services.is_empty() {
        return "- none".to_string();
    }
    let mut out = Vec::new();
    for service in services {
        let id = service
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "new".to_string());
        let name = if service.name.is_empty() {
            "(unnamed)"
        } else {
            service.name.as_str()
        };
        out.push(
            format!(
                "service {id} {name} type={} mode={}",
                service.ha.ha_type,
                display_or_none(&service.ha.ha_mode)
            )
            .cyan()
            .to_string(),
        );
        out.push(format!("- primary: {}", slot_text(service.ha.primary_id)));
        out.push(format!("- secondary: {}", slot_text(service.ha.secondary_id)));
        out.push(format!("- backups: {}", join_ids(service.ha.backup_ids.iter())));
        out.push(format!("- members: {}", join_ids(service.daemons.iter())));
    }
    out.join("\n")
}

/// Render the HA peer fact of one configuration.
pub fn render_fact(fact: &HaPeerFact) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "ha type={} mode={} this_server={} role={}",
            fact.ha_type, fact.mode, fact.this_server_name, fact.this_server_role
        )
        .cyan()
        .to_string(),
    );
    for peer in &fact.peers {
        let line = format!("- {} {} {}", peer.name, peer.role, peer.url);
        if peer.name == fact.this_server_name {
            out.push(format!("{line} (this server)").green().to_string());
        } else {
            out.push(line);
        }
    }
    out.join("\n")
}

/// Render log targets, marking the ones whose file may be viewed.
pub fn render_log_targets(targets: &[LogTarget]) -> String {
    if targets.is_empty() {
        return "- none".to_string();
    }
    targets
        .iter()
        .map(|target| {
            let line = format!(
                "- {} severity={} output={}",
                target.name, target.severity, target.output
            );
            if is_file_output(&target.output) {
                format!("{line} {}", "[file]".green())
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render served subnets with their pool capacities.
pub fn render_subnets(subnets: &[LocalSubnet]) -> String {
    if subnets.is_empty() {
        return "- none".to_string();
    }
    let mut out = Vec::new();
    for subnet in subnets {
        let id = subnet
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!(
            "- {} id={id} addresses={}",
            subnet.prefix,
            subnet.total_addresses()
        );
        if !subnet.prefix_pools.is_empty() {
            line.push_str(&format!(
                " delegated_prefixes={}",
                subnet.total_delegated_prefixes()
            ));
        }
        if let Some(network) = &subnet.shared_network {
            line.push_str(&format!(" shared_network={network}"));
        }
        out.push(line);
    }
    out.join("\n")
}

/// Render the outcome of a configuration refresh.
pub fn render_refresh(outcome: &RefreshOutcome) -> String {
    let mut out = Vec::new();
    let status = if outcome.config_changed {
        "changed".yellow().to_string()
    } else {
        "unchanged".green().to_string()
    };
    out.push(format!(
        "daemon={} config={status} hash={}",
        outcome.daemon_id, outcome.config_hash
    ));
    out.push(String::new());
    out.push("log_targets".to_string());
    out.push(render_log_targets(&outcome.log_targets));
    out.push(String::new());
    out.push("services".to_string());
    let services: Vec<Service> = outcome
        .services
        .iter()
        .map(|result| result.service.clone())
        .collect();
    out.push(render_services(&services));
    out.join("\n")
}

fn slot_text(holder: Option<i64>) -> String {
    holder
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a i64>) -> String {
    let ids: Vec<String> = ids.map(i64::to_string).collect();
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "none"
    } else {
        value
    }
}
