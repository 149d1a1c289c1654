use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::control_url::AccessPoint;
use crate::error::{FleetError, FleetResult, StorageContext};
use crate::model::{App, Daemon, DaemonName};

const APP_COLUMNS: &str = "id, name, control_address, control_port, control_secure, created_at";

/// Register an app reachable at `access_point`.
///
/// Fails with [`FleetError::Conflict`] when another app already uses the
/// same host and port.
pub fn add_app(conn: &Connection, name: &str, access_point: &AccessPoint) -> FleetResult<App> {
    if let Some(existing) = find_app_by_access_point(conn, access_point)? {
        return Err(FleetError::Conflict(format!(
            "app {} is already registered at {}",
            existing.id, access_point
        )));
    }
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO app (name, control_address, control_port, control_secure, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            access_point.address,
            access_point.port,
            access_point.secure,
            created_at
        ],
    )
    .storage_context(|| format!("failed to add app {name}"))?;
    Ok(App {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        access_point: access_point.clone(),
        created_at,
    })
}

/// Add a daemon to an app. An app runs at most one daemon of each kind.
pub fn add_daemon(conn: &Connection, app_id: i64, name: DaemonName) -> FleetResult<Daemon> {
    if get_app(conn, app_id)?.is_none() {
        return Err(FleetError::NotFound {
            entity: "app",
            id: app_id,
        });
    }
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM daemon WHERE app_id = ?1 AND name = ?2",
            params![app_id, name.as_str()],
            |row| row.get(0),
        )
        .optional()
        .storage_context(|| format!("failed to look up {name} daemon of app {app_id}"))?;
    if let Some(id) = exists {
        return Err(FleetError::Conflict(format!(
            "app {app_id} already has a {name} daemon (id {id})"
        )));
    }

    conn.execute(
        "INSERT INTO daemon (app_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![app_id, name.as_str(), Utc::now()],
    )
    .storage_context(|| format!("failed to add {name} daemon to app {app_id}"))?;
    Ok(Daemon::new(conn.last_insert_rowid(), app_id, name))
}

pub fn get_app(conn: &Connection, id: i64) -> FleetResult<Option<App>> {
    conn.query_row(
        &format!("SELECT {APP_COLUMNS} FROM app WHERE id = ?1"),
        params![id],
        app_from_row,
    )
    .optional()
    .storage_context(|| format!("failed to get app {id}"))
}

pub fn get_apps(conn: &Connection) -> FleetResult<Vec<App>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {APP_COLUMNS} FROM app ORDER BY id"))
        .storage_context(|| "failed to prepare app query".to_string())?;
    let apps = stmt
        .query_map([], app_from_row)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .storage_context(|| "failed to list apps".to_string())?;
    Ok(apps)
}

/// App whose control endpoint has the same host and port.
pub fn find_app_by_access_point(
    conn: &Connection,
    access_point: &AccessPoint,
) -> FleetResult<Option<App>> {
    conn.query_row(
        &format!(
            "SELECT {APP_COLUMNS} FROM app WHERE control_address = ?1 AND control_port = ?2"
        ),
        params![access_point.address, access_point.port],
        app_from_row,
    )
    .optional()
    .storage_context(|| format!("failed to find app at {access_point}"))
}

fn app_from_row(row: &Row<'_>) -> rusqlite::Result<App> {
    let created_at: DateTime<Utc> = row.get(5)?;
    Ok(App {
        id: row.get(0)?,
        name: row.get(1)?,
        access_point: AccessPoint::new(row.get::<_, String>(2)?, row.get(3)?, row.get(4)?),
        created_at,
    })
}
