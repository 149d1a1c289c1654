use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{FleetError, FleetResult, StorageContext};

pub(crate) const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    control_address TEXT NOT NULL,
    control_port INTEGER NOT NULL,
    control_secure INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (control_address, control_port)
);

CREATE TABLE IF NOT EXISTS daemon (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id INTEGER NOT NULL REFERENCES app (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    config TEXT,
    config_hash TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    UNIQUE (app_id, name)
);

CREATE TABLE IF NOT EXISTS service (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT '',
    ha_type TEXT NOT NULL,
    ha_mode TEXT NOT NULL DEFAULT '',
    primary_id INTEGER REFERENCES daemon (id) ON DELETE SET NULL,
    secondary_id INTEGER REFERENCES daemon (id) ON DELETE SET NULL,
    backup_ids TEXT NOT NULL DEFAULT '[]',
    primary_last_state TEXT,
    secondary_last_state TEXT,
    primary_status_collected_at TEXT,
    secondary_status_collected_at TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daemon_to_service (
    daemon_id INTEGER NOT NULL REFERENCES daemon (id) ON DELETE CASCADE,
    service_id INTEGER NOT NULL REFERENCES service (id) ON DELETE CASCADE,
    PRIMARY KEY (daemon_id, service_id)
);

CREATE TABLE IF NOT EXISTS log_target (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    daemon_id INTEGER NOT NULL REFERENCES daemon (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    severity TEXT NOT NULL,
    output TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS log_target_daemon_idx ON log_target (daemon_id);

CREATE TABLE IF NOT EXISTS config_review (
    daemon_id INTEGER PRIMARY KEY REFERENCES daemon (id) ON DELETE CASCADE,
    config_hash TEXT NOT NULL,
    report_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Create missing tables and record the schema version.
pub(crate) fn initialize(conn: &Connection) -> FleetResult<()> {
    conn.execute_batch(SCHEMA)
        .storage_context(|| "failed to create schema".to_string())?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .storage_context(|| "failed to read schema version".to_string())?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO schema_meta (key, value) VALUES ('version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )
            .storage_context(|| "failed to record schema version".to_string())?;
            Ok(())
        }
        Some(version) if version == SCHEMA_VERSION.to_string() => Ok(()),
        Some(version) => Err(FleetError::Conflict(format!(
            "database schema version {version} is not supported (expected {SCHEMA_VERSION})"
        ))),
    }
}
