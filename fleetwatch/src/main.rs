use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use config_tree_core::{parse_file_with_includes, ConfigNode};
use fleetwatch::config::{default_config, load_config, FleetConfig};
use fleetwatch::inspect::render_tree;
use fleetwatch::kea_config::KeaConfig;
use fleetwatch::logging::init_tracing;

mod cli;
mod facts_cmd;
mod store_cmd;

use cli::{Cli, Command, InspectArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = resolve_settings(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.store.path = db;
    }
    init_tracing(&settings.logging)?;

    match cli.command {
        Command::Inspect(args) => run_inspect(args),
        Command::Facts(args) => facts_cmd::run_facts(args),
        Command::AddApp(args) => store_cmd::run_add_app(&settings, args),
        Command::Refresh(args) => store_cmd::run_refresh(&settings, args),
        Command::Services(args) => store_cmd::run_services(&settings, args),
        Command::LogAllowed(args) => store_cmd::run_log_allowed(&settings, args),
        Command::Review(args) => store_cmd::run_review(&settings, args),
    }
}

fn resolve_settings(path: Option<&Path>) -> Result<FleetConfig> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(default_config()),
    }
}

/// Parse a configuration file, expanding include statements.
pub(crate) fn read_config(path: &Path) -> Result<KeaConfig> {
    let tree = parse_file_with_includes(path)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(KeaConfig::from_node(tree))
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = read_config(&args.file)?;
    let tree = if args.redact {
        config.redacted()
    } else {
        config.tree().clone()
    };

    let target: &ConfigNode = match &args.section {
        Some(section) => tree
            .get(section)
            .with_context(|| format!("section '{section}' not found"))?,
        None => &tree,
    };

    println!("hash={}", config.hash());
    print!("{}", render_tree(target, args.depth));
    Ok(())
}
