use anyhow::{bail, Context, Result};
use config_tree_core::expand_includes;
use fleetwatch::config::FleetConfig;
use fleetwatch::control_url::parse_url;
use fleetwatch::engine::Engine;
use fleetwatch::reconcile::{read_snapshot, record_config_review};
use fleetwatch::report::{render_refresh, render_services};
use fleetwatch::store::app::{add_app, add_daemon};
use fleetwatch::store::service::{get_services, get_services_for_daemon};
use fleetwatch::store::Store;
use fleetwatch::FleetError;
use tracing::warn;

use crate::cli::{AddAppArgs, LogAllowedArgs, OutputFormat, RefreshArgs, ReviewArgs, ServicesArgs};

pub fn run_add_app(settings: &FleetConfig, args: AddAppArgs) -> Result<()> {
    let access_point = parse_url(&args.control_url)
        .with_context(|| format!("invalid control URL '{}'", args.control_url))?;
    let store = Store::open(settings.store.clone())?;

    let (app, daemons) = store.transaction(|tx| {
        let app = add_app(tx, &args.name, &access_point)?;
        let daemons = args
            .daemons
            .iter()
            .map(|name| add_daemon(tx, app.id, *name))
            .collect::<Result<Vec<_>, FleetError>>()?;
        Ok((app, daemons))
    })?;

    println!("app={} name={} control={}", app.id, app.name, app.access_point);
    for daemon in daemons {
        println!("- daemon={} name={}", daemon.id, daemon.name);
    }
    Ok(())
}

pub fn run_refresh(settings: &FleetConfig, args: RefreshArgs) -> Result<()> {
    let raw = expand_includes(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let engine = Engine::open(settings.store.clone())?;
    let mut attempt = 0;
    let outcome = loop {
        match engine.refresh(args.daemon_id, &raw) {
            Err(err) if err.is_retryable() && attempt < args.retries => {
                attempt += 1;
                warn!(daemon_id = args.daemon_id, attempt, %err, "retrying configuration refresh");
            }
            result => {
                break result
                    .with_context(|| format!("failed to refresh daemon {}", args.daemon_id))?
            }
        }
    };

    match args.format {
        OutputFormat::Text => println!("{}", render_refresh(&outcome)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

pub fn run_services(settings: &FleetConfig, args: ServicesArgs) -> Result<()> {
    let store = Store::open(settings.store.clone())?;
    let conn = store.connect()?;
    let services = match args.daemon_id {
        Some(daemon_id) => get_services_for_daemon(&conn, daemon_id)?,
        None => get_services(&conn)?,
    };

    match args.format {
        OutputFormat::Text => println!("{}", render_services(&services)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&services)?),
    }
    Ok(())
}

pub fn run_log_allowed(settings: &FleetConfig, args: LogAllowedArgs) -> Result<()> {
    let engine = Engine::open(settings.store.clone())?;
    let allowed = engine.log_allowed(args.daemon_id, &args.path);
    println!(
        "allowed={allowed} daemon={} path={}",
        args.daemon_id, args.path
    );
    if !allowed {
        bail!(
            "log file {} is not written by daemon {}",
            args.path,
            args.daemon_id
        );
    }
    Ok(())
}

pub fn run_review(settings: &FleetConfig, args: ReviewArgs) -> Result<()> {
    let store = Store::open(settings.store.clone())?;
    let mut snapshot = read_snapshot(&store, args.daemon_id)?;
    if let Some(hash) = args.hash {
        snapshot.config_hash = hash;
    }
    let review = record_config_review(&store, &snapshot, args.reports)?;
    println!(
        "reviewed daemon={} hash={} reports={}",
        review.daemon_id, review.config_hash, review.report_count
    );
    Ok(())
}
