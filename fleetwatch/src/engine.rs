use std::sync::Arc;

use crate::error::FleetResult;
use crate::kea_config::KeaConfig;
use crate::log_allow::{LogAccessRegistry, LogAllowList};
use crate::reconcile::{apply_config_then, parse_config, read_snapshot, DaemonSnapshot, RefreshOutcome};
use crate::store::daemon::get_daemons;
use crate::store::{Store, StoreConfig};

/// Store plus the in-memory state derived from it.
///
/// Allow-lists are published only after the refresh that produced them has
/// committed, so readers never see access granted for uncommitted state.
/// Publishing happens under the daemon lock, so lists are replaced in commit
/// order.
#[derive(Debug)]
pub struct Engine {
    store: Store,
    log_access: LogAccessRegistry,
}

impl Engine {
    /// Open the store and load allow-lists from the persisted log targets.
    pub fn open(config: StoreConfig) -> FleetResult<Self> {
        let engine = Self {
            store: Store::open(config)?,
            log_access: LogAccessRegistry::new(),
        };
        engine.reload_log_access()?;
        Ok(engine)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn log_access(&self) -> &LogAccessRegistry {
        &self.log_access
    }

    /// Rebuild every allow-list from the database.
    pub fn reload_log_access(&self) -> FleetResult<()> {
        let conn = self.store.connect()?;
        for daemon in get_daemons(&conn)? {
            let list = LogAllowList::from_targets(&daemon.log_targets);
            self.log_access.replace(daemon.id, Arc::new(list));
        }
        Ok(())
    }

    /// Apply a received configuration to a daemon as currently stored.
    ///
    /// `FleetError::Stale` and `FleetError::LockConflict` are returned
    /// unchanged; retrying is up to the caller.
    pub fn refresh(&self, daemon_id: i64, raw: &str) -> FleetResult<RefreshOutcome> {
        let snapshot = read_snapshot(&self.store, daemon_id)?;
        self.apply(&snapshot, parse_config(daemon_id, raw)?)
    }

    /// Apply a configuration on top of a snapshot read earlier.
    ///
    /// The allow-list is published after the commit, before the daemon lock
    /// is released.
    pub fn apply(&self, snapshot: &DaemonSnapshot, config: KeaConfig) -> FleetResult<RefreshOutcome> {
        apply_config_then(&self.store, snapshot, config, |outcome| {
            self.log_access
                .replace(outcome.daemon_id, Arc::clone(&outcome.allow_list));
        })
    }

    pub fn log_allowed(&self, daemon_id: i64, path: &str) -> bool {
        self.log_access.allowed(daemon_id, path)
    }
}
