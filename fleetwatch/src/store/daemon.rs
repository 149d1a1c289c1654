use std::sync::Arc;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::log_target::get_log_targets;
use crate::control_url::AccessPoint;
use crate::error::{FleetError, FleetResult, StorageContext};
use crate::kea_config::KeaConfig;
use crate::model::{Daemon, DaemonName};

type DaemonRow = (i64, i64, String, Option<String>, String);

const DAEMON_COLUMNS: &str = "id, app_id, name, config, config_hash";

pub fn get_daemon(conn: &Connection, id: i64) -> FleetResult<Option<Daemon>> {
    let row: Option<DaemonRow> = conn
        .query_row(
            &format!("SELECT {DAEMON_COLUMNS} FROM daemon WHERE id = ?1"),
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()
        .storage_context(|| format!("failed to get daemon {id}"))?;
    row.map(|row| daemon_from_row(conn, row)).transpose()
}

/// Daemons with the given ids in ascending id order. Unknown ids are
/// silently absent from the result.
pub fn get_daemons_by_ids(conn: &Connection, ids: &[i64]) -> FleetResult<Vec<Daemon>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT {DAEMON_COLUMNS} FROM daemon WHERE id IN ({placeholders}) ORDER BY id");
    query_daemons(conn, &sql, params_from_iter(ids.iter()))
}

pub fn get_daemons(conn: &Connection) -> FleetResult<Vec<Daemon>> {
    query_daemons(
        conn,
        &format!("SELECT {DAEMON_COLUMNS} FROM daemon ORDER BY id"),
        [],
    )
}

fn query_daemons<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> FleetResult<Vec<Daemon>> {
    let mut stmt = conn
        .prepare(sql)
        .storage_context(|| "failed to prepare daemon query".to_string())?;
    let rows: Vec<DaemonRow> = stmt
        .query_map(params, |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })
        .and_then(|rows| rows.collect())
        .storage_context(|| "failed to select daemons".to_string())?;
    rows.into_iter()
        .map(|row| daemon_from_row(conn, row))
        .collect()
}

fn daemon_from_row(conn: &Connection, row: DaemonRow) -> FleetResult<Daemon> {
    let (id, app_id, name, config, config_hash) = row;
    let name: DaemonName = name
        .parse()
        .map_err(|reason| FleetError::InvalidConfig { daemon_id: id, reason })?;
    let config = config
        .map(|text| {
            KeaConfig::from_json(&text).map_err(|err| FleetError::InvalidConfig {
                daemon_id: id,
                reason: format!("stored configuration is unreadable: {err}"),
            })
        })
        .transpose()?;

    Ok(Daemon {
        id,
        app_id,
        name,
        config: config.map(Arc::new),
        config_hash,
        log_targets: get_log_targets(conn, id)?,
        subnet_index: None,
    })
}

/// Persist the configuration and its hash.
///
/// Fails with [`FleetError::NotFound`] when the daemon row is gone.
pub fn update_daemon_config(conn: &Connection, daemon: &Daemon) -> FleetResult<()> {
    let config = daemon
        .config
        .as_deref()
        .map(KeaConfig::to_json)
        .transpose()
        .map_err(|err| FleetError::InvalidConfig {
            daemon_id: daemon.id,
            reason: err.to_string(),
        })?;
    let updated = conn
        .execute(
            "UPDATE daemon SET config = ?1, config_hash = ?2 WHERE id = ?3",
            params![config, daemon.config_hash, daemon.id],
        )
        .storage_context(|| format!("failed to update daemon {}", daemon.id))?;
    if updated == 0 {
        return Err(FleetError::NotFound {
            entity: "daemon",
            id: daemon.id,
        });
    }
    debug!(daemon_id = daemon.id, hash = %daemon.config_hash, "stored daemon configuration");
    Ok(())
}

/// Control endpoint of the app hosting the daemon.
pub fn daemon_access_point(conn: &Connection, daemon_id: i64) -> FleetResult<Option<AccessPoint>> {
    conn.query_row(
        "SELECT a.control_address, a.control_port, a.control_secure \
         FROM daemon d JOIN app a ON a.id = d.app_id WHERE d.id = ?1",
        params![daemon_id],
        |row| {
            Ok(AccessPoint::new(
                row.get::<_, String>(0)?,
                row.get(1)?,
                row.get(2)?,
            ))
        },
    )
    .optional()
    .storage_context(|| format!("failed to get control endpoint of daemon {daemon_id}"))
}

/// Daemon of kind `name` in the app at `access_point`.
pub fn find_daemon_by_access_point(
    conn: &Connection,
    access_point: &AccessPoint,
    name: DaemonName,
) -> FleetResult<Option<i64>> {
    conn.query_row(
        "SELECT d.id FROM daemon d JOIN app a ON a.id = d.app_id \
         WHERE a.control_address = ?1 AND a.control_port = ?2 AND d.name = ?3",
        params![access_point.address, access_point.port, name.as_str()],
        |row| row.get(0),
    )
    .optional()
    .storage_context(|| format!("failed to find {name} daemon at {access_point}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        daemon_access_point, find_daemon_by_access_point, get_daemon, get_daemons,
        get_daemons_by_ids, update_daemon_config,
    };
    use crate::control_url::AccessPoint;
    use crate::kea_config::KeaConfig;
    use crate::model::{Daemon, DaemonName};
    use crate::store::app::{add_app, add_daemon};
    use crate::store::test_support::temp_store;

    #[test]
    fn stores_and_reloads_configuration() {
        let (_dir, store) = temp_store();
        let conn = store.connect().expect("connect");
        let ap = AccessPoint::new("192.0.2.66", 8000, false);
        let app = add_app(&conn, "server2", &ap).expect("app");
        let mut daemon = add_daemon(&conn, app.id, DaemonName::Dhcp4).expect("daemon");

        let config = KeaConfig::from_json(r#"{"Dhcp4": {"valid-lifetime": 4000}}"#).expect("cfg");
        daemon.set_config(Arc::new(config));
        update_daemon_config(&conn, &daemon).expect("update");

        let loaded = get_daemon(&conn, daemon.id).expect("get").expect("daemon");
        assert_eq!(loaded.config_hash, daemon.config_hash);
        assert_eq!(
            loaded.config.as_ref().and_then(|c| c.tree().get_i64(&["Dhcp4", "valid-lifetime"])),
            Some(4000)
        );
        assert_eq!(get_daemons(&conn).expect("all").len(), 1);

        assert_eq!(daemon_access_point(&conn, daemon.id).expect("ap"), Some(ap.clone()));
        assert_eq!(
            find_daemon_by_access_point(&conn, &ap, DaemonName::Dhcp4).expect("find"),
            Some(daemon.id)
        );
        assert_eq!(
            find_daemon_by_access_point(&conn, &ap, DaemonName::Dhcp6).expect("find"),
            None
        );
    }

    #[test]
    fn updating_a_missing_daemon_is_not_found() {
        let (_dir, store) = temp_store();
        let conn = store.connect().expect("connect");
        let err = update_daemon_config(&conn, &Daemon::new(77, 1, DaemonName::Dhcp4))
            .expect_err("missing");
        assert!(err.is_not_found());
        assert!(get_daemon(&conn, 77).expect("get").is_none());
        assert!(get_daemons_by_ids(&conn, &[77]).expect("ids").is_empty());
    }
}
