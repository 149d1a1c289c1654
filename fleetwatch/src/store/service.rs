use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::daemon::{daemon_access_point, find_daemon_by_access_point};
use crate::control_url::AccessPoint;
use crate::error::{FleetError, FleetResult, StorageContext};
use crate::ha_detect::{HaDirectory, ServiceResult};
use crate::model::{DaemonName, HaService, Service};

const SERVICE_COLUMNS: &str = "id, name, ha_type, ha_mode, primary_id, secondary_id, backup_ids, \
     primary_last_state, secondary_last_state, primary_status_collected_at, \
     secondary_status_collected_at, created_at";

struct ServiceRow {
    id: i64,
    name: String,
    ha_type: String,
    ha_mode: String,
    primary_id: Option<i64>,
    secondary_id: Option<i64>,
    backup_ids: String,
    primary_last_state: Option<String>,
    secondary_last_state: Option<String>,
    primary_status_collected_at: Option<DateTime<Utc>>,
    secondary_status_collected_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ServiceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            ha_type: row.get(2)?,
            ha_mode: row.get(3)?,
            primary_id: row.get(4)?,
            secondary_id: row.get(5)?,
            backup_ids: row.get(6)?,
            primary_last_state: row.get(7)?,
            secondary_last_state: row.get(8)?,
            primary_status_collected_at: row.get(9)?,
            secondary_status_collected_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_service(self, conn: &Connection) -> FleetResult<Service> {
        let ha_type: DaemonName = self.ha_type.parse().map_err(|reason: String| {
            FleetError::Conflict(format!("service {} has {reason}", self.id))
        })?;
        let backup_ids: BTreeSet<i64> = serde_json::from_str(&self.backup_ids)
            .storage_context(|| format!("failed to decode backups of service {}", self.id))?;
        Ok(Service {
            id: Some(self.id),
            name: self.name,
            created_at: Some(self.created_at),
            ha: HaService {
                ha_type,
                ha_mode: self.ha_mode,
                primary_id: self.primary_id,
                secondary_id: self.secondary_id,
                backup_ids,
                primary_last_state: self.primary_last_state,
                secondary_last_state: self.secondary_last_state,
                primary_status_collected_at: self.primary_status_collected_at,
                secondary_status_collected_at: self.secondary_status_collected_at,
            },
            daemons: service_members(conn, self.id)?,
        })
    }
}

/// Insert a new service and its memberships, assigning id and creation
/// time.
pub fn add_service(conn: &Connection, service: &mut Service) -> FleetResult<()> {
    if let Some(id) = service.id {
        return Err(FleetError::Conflict(format!("service {id} already exists")));
    }
    let backup_ids = serde_json::to_string(&service.ha.backup_ids)
        .storage_context(|| "failed to encode backup daemons".to_string())?;
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO service (name, ha_type, ha_mode, primary_id, secondary_id, backup_ids, \
         primary_last_state, secondary_last_state, primary_status_collected_at, \
         secondary_status_collected_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            service.name,
            service.ha.ha_type.as_str(),
            service.ha.ha_mode,
            service.ha.primary_id,
            service.ha.secondary_id,
            backup_ids,
            service.ha.primary_last_state,
            service.ha.secondary_last_state,
            service.ha.primary_status_collected_at,
            service.ha.secondary_status_collected_at,
            created_at,
        ],
    )
    .storage_context(|| "failed to add service".to_string())?;
    let id = conn.last_insert_rowid();
    service.id = Some(id);
    service.created_at = Some(created_at);

    for daemon_id in service.daemons.clone() {
        add_daemon_to_service(conn, id, daemon_id)?;
    }
    info!(service_id = id, ha_type = %service.ha.ha_type, "created HA service");
    Ok(())
}

/// Write the HA attributes of a persisted service.
pub fn update_service(conn: &Connection, service: &Service) -> FleetResult<()> {
    let Some(id) = service.id else {
        return Err(FleetError::Conflict(
            "cannot update a service that was never stored".to_string(),
        ));
    };
    let backup_ids = serde_json::to_string(&service.ha.backup_ids)
        .storage_context(|| format!("failed to encode backups of service {id}"))?;
    let updated = conn
        .execute(
            "UPDATE service SET name = ?1, ha_mode = ?2, primary_id = ?3, secondary_id = ?4, \
             backup_ids = ?5, primary_last_state = ?6, secondary_last_state = ?7, \
             primary_status_collected_at = ?8, secondary_status_collected_at = ?9 \
             WHERE id = ?10",
            params![
                service.name,
                service.ha.ha_mode,
                service.ha.primary_id,
                service.ha.secondary_id,
                backup_ids,
                service.ha.primary_last_state,
                service.ha.secondary_last_state,
                service.ha.primary_status_collected_at,
                service.ha.secondary_status_collected_at,
                id,
            ],
        )
        .storage_context(|| format!("failed to update service {id}"))?;
    if updated == 0 {
        return Err(FleetError::NotFound {
            entity: "service",
            id,
        });
    }
    Ok(())
}

/// Associate a daemon with a service.
///
/// Returns false when the association already exists. A daemon belongs to at
/// most one service of each HA type; joining a second one is a
/// [`FleetError::Conflict`].
pub fn add_daemon_to_service(conn: &Connection, service_id: i64, daemon_id: i64) -> FleetResult<bool> {
    let ha_type: Option<String> = conn
        .query_row(
            "SELECT ha_type FROM service WHERE id = ?1",
            params![service_id],
            |row| row.get(0),
        )
        .optional()
        .storage_context(|| format!("failed to get service {service_id}"))?;
    let Some(ha_type) = ha_type else {
        return Err(FleetError::NotFound {
            entity: "service",
            id: service_id,
        });
    };

    let other: Option<i64> = conn
        .query_row(
            "SELECT s.id FROM daemon_to_service m JOIN service s ON s.id = m.service_id \
             WHERE m.daemon_id = ?1 AND s.ha_type = ?2 AND s.id <> ?3",
            params![daemon_id, ha_type, service_id],
            |row| row.get(0),
        )
        .optional()
        .storage_context(|| format!("failed to check services of daemon {daemon_id}"))?;
    if let Some(other) = other {
        return Err(FleetError::Conflict(format!(
            "daemon {daemon_id} already belongs to {ha_type} service {other}"
        )));
    }

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO daemon_to_service (daemon_id, service_id) VALUES (?1, ?2)",
            params![daemon_id, service_id],
        )
        .storage_context(|| format!("failed to add daemon {daemon_id} to service {service_id}"))?;
    Ok(inserted > 0)
}

/// Persist the outcome of HA detection.
pub fn persist_service_result(conn: &Connection, result: &mut ServiceResult) -> FleetResult<()> {
    if result.is_new {
        add_service(conn, &mut result.service)?;
        result.is_new = false;
        return Ok(());
    }
    let Some(service_id) = result.service.id else {
        return Err(FleetError::Conflict(
            "existing service result without an id".to_string(),
        ));
    };
    if result.changed {
        update_service(conn, &result.service)?;
    }
    for daemon_id in &result.added_members {
        add_daemon_to_service(conn, service_id, *daemon_id)?;
    }
    Ok(())
}

pub fn get_service(conn: &Connection, id: i64) -> FleetResult<Option<Service>> {
    let row = conn
        .query_row(
            &format!("SELECT {SERVICE_COLUMNS} FROM service WHERE id = ?1"),
            params![id],
            ServiceRow::read,
        )
        .optional()
        .storage_context(|| format!("failed to get service {id}"))?;
    row.map(|row| row.into_service(conn)).transpose()
}

pub fn get_services(conn: &Connection) -> FleetResult<Vec<Service>> {
    query_services(
        conn,
        &format!("SELECT {SERVICE_COLUMNS} FROM service ORDER BY id"),
        params![],
    )
}

pub fn get_services_by_ha_type(conn: &Connection, ha_type: DaemonName) -> FleetResult<Vec<Service>> {
    query_services(
        conn,
        &format!("SELECT {SERVICE_COLUMNS} FROM service WHERE ha_type = ?1 ORDER BY id"),
        params![ha_type.as_str()],
    )
}

/// Services a daemon is a member of.
pub fn get_services_for_daemon(conn: &Connection, daemon_id: i64) -> FleetResult<Vec<Service>> {
    query_services(
        conn,
        &format!(
            "SELECT {SERVICE_COLUMNS} FROM service WHERE id IN \
             (SELECT service_id FROM daemon_to_service WHERE daemon_id = ?1) ORDER BY id"
        ),
        params![daemon_id],
    )
}

/// Id of the service of `ha_type` the daemon is a member of.
pub fn find_daemon_service(
    conn: &Connection,
    daemon_id: i64,
    ha_type: DaemonName,
) -> FleetResult<Option<i64>> {
    conn.query_row(
        "SELECT s.id FROM daemon_to_service m JOIN service s ON s.id = m.service_id \
         WHERE m.daemon_id = ?1 AND s.ha_type = ?2 ORDER BY s.id LIMIT 1",
        params![daemon_id, ha_type.as_str()],
        |row| row.get(0),
    )
    .optional()
    .storage_context(|| format!("failed to find {ha_type} service of daemon {daemon_id}"))
}

fn query_services<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> FleetResult<Vec<Service>> {
    let mut stmt = conn
        .prepare(sql)
        .storage_context(|| "failed to prepare service query".to_string())?;
    let rows = stmt
        .query_map(params, ServiceRow::read)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .storage_context(|| "failed to select services".to_string())?;
    rows.into_iter().map(|row| row.into_service(conn)).collect()
}

fn service_members(conn: &Connection, service_id: i64) -> FleetResult<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT daemon_id FROM daemon_to_service WHERE service_id = ?1 ORDER BY daemon_id")
        .storage_context(|| "failed to prepare membership query".to_string())?;
    let members = stmt
        .query_map(params![service_id], |row| row.get(0))
        .and_then(|rows| rows.collect::<Result<Vec<i64>, _>>())
        .storage_context(|| format!("failed to get members of service {service_id}"))?;
    Ok(members)
}

/// Detection reads straight from the connection it is given, so inside a
/// transaction it sees that transaction's view.
impl HaDirectory for Connection {
    fn ha_services(&self, ha_type: DaemonName) -> FleetResult<Vec<Service>> {
        get_services_by_ha_type(self, ha_type)
    }

    fn daemon_access_point(&self, daemon_id: i64) -> FleetResult<Option<AccessPoint>> {
        daemon_access_point(self, daemon_id)
    }

    fn find_daemon(&self, access_point: &AccessPoint, name: DaemonName) -> FleetResult<Option<i64>> {
        find_daemon_by_access_point(self, access_point, name)
    }

    fn daemon_service(&self, daemon_id: i64, ha_type: DaemonName) -> FleetResult<Option<i64>> {
        find_daemon_service(self, daemon_id, ha_type)
    }
}
