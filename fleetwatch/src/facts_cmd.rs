use anyhow::{Context, Result};
use fleetwatch::extract::{ha_peer_fact_from_config, log_targets_from_config, HaPeerFact};
use fleetwatch::kea_config::KeaConfig;
use fleetwatch::log_allow::LogAllowList;
use fleetwatch::model::{DaemonName, LogTarget};
use fleetwatch::report::{render_fact, render_log_targets, render_subnets};
use fleetwatch::subnets::{local_subnets, LocalSubnet};
use serde::Serialize;

use crate::cli::{FactsArgs, OutputFormat};

#[derive(Debug, Serialize)]
struct FactsReport {
    root: Option<String>,
    daemon: DaemonName,
    hash: String,
    ha: Option<HaPeerFact>,
    log_targets: Vec<LogTarget>,
    log_files: Vec<String>,
    subnets: Vec<LocalSubnet>,
}

pub fn run_facts(args: FactsArgs) -> Result<()> {
    let config = crate::read_config(&args.file)?;
    let daemon = match args.daemon {
        Some(daemon) => daemon,
        None => daemon_for_root(&config).with_context(|| {
            format!(
                "cannot tell the daemon kind of {}; pass --daemon",
                args.file.display()
            )
        })?,
    };

    let log_targets = log_targets_from_config(0, &config);
    let report = FactsReport {
        root: config.root_name().map(str::to_string),
        daemon,
        hash: config.hash().to_string(),
        ha: ha_peer_fact_from_config(daemon, &config),
        log_files: LogAllowList::from_targets(&log_targets)
            .paths()
            .map(str::to_string)
            .collect(),
        log_targets,
        subnets: local_subnets(&config),
    };

    match args.format {
        OutputFormat::Text => println!("{}", render_facts_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn daemon_for_root(config: &KeaConfig) -> Option<DaemonName> {
    match config.root_name()? {
        "Dhcp4" => Some(DaemonName::Dhcp4),
        "Dhcp6" => Some(DaemonName::Dhcp6),
        _ => None,
    }
}

fn render_facts_text(report: &FactsReport) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "root={} daemon={} hash={}",
        report.root.as_deref().unwrap_or("unknown"),
        report.daemon,
        report.hash
    ));
    out.push(String::new());
    match &report.ha {
        Some(fact) => out.push(render_fact(fact)),
        None => out.push("ha none".to_string()),
    }
    out.push(String::new());
    out.push("log_targets".to_string());
    out.push(render_log_targets(&report.log_targets));
    out.push(String::new());
    out.push("subnets".to_string());
    out.push(render_subnets(&report.subnets));
    out.join("\n")
}
