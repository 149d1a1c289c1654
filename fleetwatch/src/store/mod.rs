//! SQLite persistence of apps, daemons, services and log targets.
//!
//! Every operation opens its own connection, so a [`Store`] can be shared
//! freely between threads. Writes that depend on a daemon's configuration go
//! through [`Store::with_locked_daemons`], which serializes them per daemon.

pub mod app;
pub mod daemon;
mod locks;
pub mod log_target;
pub mod review;
mod schema;
pub mod service;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FleetError, FleetResult, StorageContext};
use crate::model::Daemon;

pub use locks::{RowLockGuard, RowLocks};

/// Connection settings of the state database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Use write-ahead logging.
    pub wal_mode: bool,
    /// How long SQLite waits for a competing writer.
    pub busy_timeout_ms: u64,
    /// How long a caller waits for daemon row locks.
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fleetwatch.sqlite3"),
            wal_mode: true,
            busy_timeout_ms: 5_000,
            lock_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Handle to the state database.
#[derive(Debug, Clone)]
pub struct Store {
    config: StoreConfig,
    locks: Arc<RowLocks>,
}

impl Store {
    /// Open the database, creating it and its schema when missing.
    pub fn open(config: StoreConfig) -> FleetResult<Self> {
        let conn = open_connection(&config, true)?;
        schema::initialize(&conn)?;
        debug!(path = %config.path.display(), "opened state database");
        Ok(Self {
            config,
            locks: Arc::new(RowLocks::default()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// New connection for reads outside any lock.
    pub fn connect(&self) -> FleetResult<Connection> {
        open_connection(&self.config, false)
    }

    /// Run `f` in an immediate transaction, committing when it returns `Ok`.
    pub fn transaction<T, F>(&self, f: F) -> FleetResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> FleetResult<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .storage_context(|| "failed to begin transaction".to_string())?;
        let value = f(&tx)?;
        tx.commit()
            .storage_context(|| "failed to commit transaction".to_string())?;
        Ok(value)
    }

    /// Lock the given daemons and run `f` in a transaction with their
    /// current rows loaded.
    ///
    /// Locks are taken for the whole set at once, so callers locking
    /// overlapping sets cannot deadlock. They are held until the transaction
    /// has been committed or rolled back. Returning `Err` from `f` rolls back
    /// every write it made. Ids are deduplicated; daemons are passed to `f` in
    /// ascending id order.
    ///
    /// # Errors
    ///
    /// [`FleetError::NoDaemonsSpecified`] for an empty set,
    /// [`FleetError::LockConflict`] when a lock is not granted within
    /// `lock_timeout_ms`, [`FleetError::NotFound`] when a daemon is missing.
    pub fn with_locked_daemons<T, F>(&self, daemon_ids: &[i64], f: F) -> FleetResult<T>
    where
        F: FnOnce(&Transaction<'_>, &[Daemon]) -> FleetResult<T>,
    {
        self.with_locked_daemons_then(daemon_ids, f, |_| {})
    }

    /// Like [`Store::with_locked_daemons`], then run `committed` on the
    /// result after the commit and before the locks are released.
    ///
    /// In-memory state derived from the committed rows is published from
    /// `committed`, so two writers of the same daemon publish in the order
    /// they committed.
    pub fn with_locked_daemons_then<T, F, C>(
        &self,
        daemon_ids: &[i64],
        f: F,
        committed: C,
    ) -> FleetResult<T>
    where
        F: FnOnce(&Transaction<'_>, &[Daemon]) -> FleetResult<T>,
        C: FnOnce(&T),
    {
        if daemon_ids.is_empty() {
            return Err(FleetError::NoDaemonsSpecified);
        }
        let wait = Duration::from_millis(self.config.lock_timeout_ms);
        let guard = self.locks.acquire(daemon_ids, wait)?;

        let result = self.transaction(|tx| {
            let daemons = daemon::get_daemons_by_ids(tx, guard.ids())?;
            if let Some(missing) = guard
                .ids()
                .iter()
                .find(|id| !daemons.iter().any(|d| d.id == **id))
            {
                return Err(FleetError::NotFound {
                    entity: "daemon",
                    id: *missing,
                });
            }
            f(tx, &daemons)
        });
        if let Ok(value) = &result {
            committed(value);
        }
        drop(guard);
        result
    }
}

fn open_connection(config: &StoreConfig, create: bool) -> FleetResult<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let path = config.path.display().to_string();
    let conn = Connection::open_with_flags(&config.path, flags)
        .storage_context(|| format!("failed to open {path}"))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .storage_context(|| "failed to set busy timeout".to_string())?;
    apply_pragmas(&conn, config).storage_context(|| format!("failed to configure {path}"))?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> rusqlite::Result<()> {
    if config.wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::{Store, StoreConfig};

    /// Store in a fresh temporary directory; keep the directory alive.
    pub fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(StoreConfig::at(dir.path().join("state.sqlite3"))).expect("open");
        (dir, store)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_store;
    use super::{Store, StoreConfig};
    use crate::control_url::AccessPoint;
    use crate::error::FleetError;
    use crate::model::DaemonName;
    use crate::store::app::{add_app, add_daemon};

    #[test]
    fn locking_nothing_is_an_error() {
        let (_dir, store) = temp_store();
        let err = store
            .with_locked_daemons(&[], |_, _| Ok(()))
            .expect_err("empty set");
        assert!(matches!(err, FleetError::NoDaemonsSpecified));
    }

    #[test]
    fn locked_daemons_are_loaded_in_id_order() {
        let (_dir, store) = temp_store();
        let ids = store
            .transaction(|tx| {
                let app = add_app(tx, "kea", &AccessPoint::new("192.0.2.1", 8000, false))?;
                let a = add_daemon(tx, app.id, DaemonName::Dhcp4)?;
                let b = add_daemon(tx, app.id, DaemonName::Dhcp6)?;
                Ok(vec![a.id, b.id])
            })
            .expect("seed");

        let names = store
            .with_locked_daemons(&[ids[1], ids[0], ids[1]], |_, daemons| {
                Ok(daemons.iter().map(|d| d.name).collect::<Vec<_>>())
            })
            .expect("lock");
        assert_eq!(names, vec![DaemonName::Dhcp4, DaemonName::Dhcp6]);
    }

    #[test]
    fn missing_daemon_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store
            .with_locked_daemons(&[42], |_, _| Ok(()))
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn committed_hook_runs_after_commit_with_locks_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StoreConfig {
            lock_timeout_ms: 50,
            ..StoreConfig::at(dir.path().join("state.sqlite3"))
        };
        let store = Store::open(config).expect("open");
        let daemon_id = store
            .transaction(|tx| {
                let app = add_app(tx, "kea", &AccessPoint::new("192.0.2.1", 8000, false))?;
                Ok(add_daemon(tx, app.id, DaemonName::Dhcp4)?.id)
            })
            .expect("seed");

        let mut seen = None;
        store
            .with_locked_daemons_then(
                &[daemon_id],
                |tx, _| {
                    tx.execute("UPDATE app SET name = 'renamed'", [])
                        .expect("rename");
                    Ok(daemon_id)
                },
                |id| {
                    let conn = store.connect().expect("connect");
                    let apps = crate::store::app::get_apps(&conn).expect("apps");
                    let competing = store.with_locked_daemons(&[*id], |_, _| Ok(()));
                    seen = Some((apps[0].name.clone(), competing));
                },
            )
            .expect("locked");

        let (name, competing) = seen.expect("hook ran");
        assert_eq!(name, "renamed");
        assert!(matches!(
            competing,
            Err(FleetError::LockConflict { daemon_id: id }) if id == daemon_id
        ));
        store
            .with_locked_daemons(&[daemon_id], |_, _| Ok(()))
            .expect("released");
    }

    #[test]
    fn committed_hook_is_skipped_on_rollback() {
        let (_dir, store) = temp_store();
        let mut ran = false;
        let err = store
            .with_locked_daemons_then(&[42], |_, _| Ok(()), |_: &()| ran = true)
            .expect_err("missing");
        assert!(err.is_not_found());
        assert!(!ran);
    }

    #[test]
    fn failed_closure_rolls_back() {
        let (_dir, store) = temp_store();
        let err = store
            .transaction(|tx| {
                add_app(tx, "kea", &AccessPoint::new("192.0.2.1", 8000, false))?;
                Err::<(), _>(FleetError::Conflict("abort".to_string()))
            })
            .expect_err("abort");
        assert!(matches!(err, FleetError::Conflict(_)));

        let conn = store.connect().expect("connect");
        assert!(crate::store::app::get_apps(&conn).expect("apps").is_empty());
    }
}
