//! Applies received configurations to persisted state.
//!
//! Pure extraction runs before any lock is taken. The locked section only
//! checks that the daemon still carries the configuration the caller based
//! its work on and then writes the derived state, all in one transaction.

use std::sync::Arc;

use rusqlite::Transaction;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{FleetError, FleetResult};
use crate::extract::{ha_peer_fact_from_config, log_targets_from_config};
use crate::ha_detect::{detect_from_fact, ServiceResult};
use crate::kea_config::KeaConfig;
use crate::log_allow::LogAllowList;
use crate::model::{Daemon, DaemonName, LogTarget};
use crate::store::daemon::{get_daemon, update_daemon_config};
use crate::store::log_target::replace_log_targets;
use crate::store::review::{put_config_review, ConfigReview};
use crate::store::service::persist_service_result;
use crate::store::Store;

/// What a caller observed about a daemon before doing work on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSnapshot {
    pub daemon_id: i64,
    pub name: DaemonName,
    pub config_hash: String,
}

impl DaemonSnapshot {
    pub fn of(daemon: &Daemon) -> Self {
        Self {
            daemon_id: daemon.id,
            name: daemon.name,
            config_hash: daemon.config_hash.clone(),
        }
    }
}

/// Current snapshot of a stored daemon.
pub fn read_snapshot(store: &Store, daemon_id: i64) -> FleetResult<DaemonSnapshot> {
    let conn = store.connect()?;
    let daemon = get_daemon(&conn, daemon_id)?.ok_or(FleetError::NotFound {
        entity: "daemon",
        id: daemon_id,
    })?;
    Ok(DaemonSnapshot::of(&daemon))
}

/// Result of applying one configuration to a daemon.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub daemon_id: i64,
    pub config_hash: String,
    /// False when the configuration was identical to the stored one.
    pub config_changed: bool,
    pub log_targets: Vec<LogTarget>,
    #[serde(skip)]
    pub allow_list: Arc<LogAllowList>,
    pub services: Vec<ServiceResult>,
}

/// Parse `raw` and apply it to the daemon as currently stored.
pub fn refresh_daemon_config(store: &Store, daemon_id: i64, raw: &str) -> FleetResult<RefreshOutcome> {
    let snapshot = read_snapshot(store, daemon_id)?;
    apply_config(store, &snapshot, parse_config(daemon_id, raw)?)
}

/// Parse a received configuration, blaming `daemon_id` on failure.
pub fn parse_config(daemon_id: i64, raw: &str) -> FleetResult<KeaConfig> {
    KeaConfig::from_json(raw).map_err(|err| FleetError::InvalidConfig {
        daemon_id,
        reason: err.to_string(),
    })
}

/// Apply a parsed configuration on top of `snapshot`.
///
/// Stores the configuration and log targets when the hash changed, then
/// detects and stores HA services. Fails with [`FleetError::Stale`] without
/// writing anything when the stored hash no longer matches the snapshot.
pub fn apply_config(
    store: &Store,
    snapshot: &DaemonSnapshot,
    config: KeaConfig,
) -> FleetResult<RefreshOutcome> {
    apply_config_then(store, snapshot, config, |_| {})
}

/// [`apply_config`], running `committed` on the outcome after the commit
/// while the daemon is still locked.
pub fn apply_config_then<C>(
    store: &Store,
    snapshot: &DaemonSnapshot,
    config: KeaConfig,
    committed: C,
) -> FleetResult<RefreshOutcome>
where
    C: FnOnce(&RefreshOutcome),
{
    let daemon_id = snapshot.daemon_id;
    let targets = log_targets_from_config(daemon_id, &config);
    let allow_list = Arc::new(LogAllowList::from_targets(&targets));
    let fact = ha_peer_fact_from_config(snapshot.name, &config);
    let config = Arc::new(config);

    store.with_locked_daemons_then(
        &[daemon_id],
        |tx, daemons| {
            let mut daemon = locked_daemon(daemons, daemon_id)?.clone();
            check_snapshot(&daemon, snapshot)?;

            let config_changed = daemon.config_hash != config.hash();
            if config_changed {
                daemon.set_config_with_targets(Arc::clone(&config), targets);
                update_daemon_config(tx, &daemon)?;
                replace_log_targets(tx, daemon_id, &mut daemon.log_targets)?;
                info!(daemon_id, hash = %daemon.config_hash, "daemon configuration changed");
            } else {
                debug!(daemon_id, "daemon configuration unchanged");
            }

            let mut services = match &fact {
                Some(fact) => detect_from_fact(&**tx, daemon_id, fact)?,
                None => Vec::new(),
            };
            for result in services.iter_mut().filter(|r| r.needs_write()) {
                persist_service_result(tx, result)?;
            }

            Ok(RefreshOutcome {
                daemon_id,
                config_hash: daemon.config_hash,
                config_changed,
                log_targets: daemon.log_targets,
                allow_list,
                services,
            })
        },
        committed,
    )
}

/// Commit writes derived from configurations read earlier.
///
/// All daemons are locked, then each snapshot is compared with the stored
/// hash. `write` only runs when none diverged; otherwise the call fails with
/// [`FleetError::Stale`] and nothing is written. An error returned by `write`
/// rolls back its writes.
pub fn commit_reviewed<T, F>(store: &Store, snapshots: &[DaemonSnapshot], write: F) -> FleetResult<T>
where
    F: FnOnce(&Transaction<'_>, &[Daemon]) -> FleetResult<T>,
{
    let ids: Vec<i64> = snapshots.iter().map(|s| s.daemon_id).collect();
    store.with_locked_daemons(&ids, |tx, daemons| {
        for snapshot in snapshots {
            check_snapshot(locked_daemon(daemons, snapshot.daemon_id)?, snapshot)?;
        }
        write(tx, daemons)
    })
}

/// Store the outcome of reviewing the configuration in `snapshot`.
pub fn record_config_review(
    store: &Store,
    snapshot: &DaemonSnapshot,
    report_count: u32,
) -> FleetResult<ConfigReview> {
    commit_reviewed(store, std::slice::from_ref(snapshot), |tx, _| {
        let review = ConfigReview {
            daemon_id: snapshot.daemon_id,
            config_hash: snapshot.config_hash.clone(),
            report_count,
            created_at: chrono::Utc::now(),
        };
        put_config_review(tx, &review)?;
        Ok(review)
    })
}

fn locked_daemon(daemons: &[Daemon], daemon_id: i64) -> FleetResult<&Daemon> {
    daemons
        .iter()
        .find(|d| d.id == daemon_id)
        .ok_or(FleetError::NotFound {
            entity: "daemon",
            id: daemon_id,
        })
}

fn check_snapshot(daemon: &Daemon, snapshot: &DaemonSnapshot) -> FleetResult<()> {
    if daemon.config_hash != snapshot.config_hash {
        debug!(
            daemon_id = daemon.id,
            expected = %snapshot.config_hash,
            actual = %daemon.config_hash,
            "daemon configuration changed since it was read"
        );
        return Err(FleetError::Stale {
            daemon_id: daemon.id,
            expected: snapshot.config_hash.clone(),
            actual: daemon.config_hash.clone(),
        });
    }
    Ok(())
}
