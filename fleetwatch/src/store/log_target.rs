use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{FleetResult, StorageContext};
use crate::model::LogTarget;

pub fn get_log_targets(conn: &Connection, daemon_id: i64) -> FleetResult<Vec<LogTarget>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, daemon_id, name, severity, output, created_at \
             FROM log_target WHERE daemon_id = ?1 ORDER BY id",
        )
        .storage_context(|| "failed to prepare log target query".to_string())?;
    let targets = stmt
        .query_map(params![daemon_id], |row| {
            Ok(LogTarget {
                id: Some(row.get(0)?),
                daemon_id: row.get(1)?,
                name: row.get(2)?,
                severity: row.get(3)?,
                output: row.get(4)?,
                created_at: Some(row.get(5)?),
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .storage_context(|| format!("failed to get log targets of daemon {daemon_id}"))?;
    Ok(targets)
}

/// Make the stored log targets of a daemon equal to `targets`.
///
/// Targets carrying an id keep their row; the severity is refreshed. Targets
/// without an id are inserted and receive one. Stored rows not present in
/// `targets` are deleted.
pub fn replace_log_targets(
    conn: &Connection,
    daemon_id: i64,
    targets: &mut [LogTarget],
) -> FleetResult<()> {
    let kept: Vec<i64> = targets.iter().filter_map(|t| t.id).collect();
    let stored = get_log_targets(conn, daemon_id)?;
    for old in stored.iter().filter(|old| old.id.is_some_and(|id| !kept.contains(&id))) {
        conn.execute("DELETE FROM log_target WHERE id = ?1", params![old.id])
            .storage_context(|| format!("failed to delete log target of daemon {daemon_id}"))?;
    }

    for target in targets.iter_mut() {
        target.daemon_id = daemon_id;
        match target.id {
            Some(id) => {
                conn.execute(
                    "UPDATE log_target SET severity = ?1 WHERE id = ?2 AND daemon_id = ?3",
                    params![target.severity, id, daemon_id],
                )
                .storage_context(|| format!("failed to update log target {id}"))?;
            }
            None => {
                let created_at = Utc::now();
                conn.execute(
                    "INSERT INTO log_target (daemon_id, name, severity, output, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![daemon_id, target.name, target.severity, target.output, created_at],
                )
                .storage_context(|| format!("failed to add log target of daemon {daemon_id}"))?;
                target.id = Some(conn.last_insert_rowid());
                target.created_at = Some(created_at);
            }
        }
    }
    Ok(())
}
