use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{FleetResult, StorageContext};

/// Outcome of the last configuration review of a daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReview {
    pub daemon_id: i64,
    /// Hash of the configuration the review was computed from.
    pub config_hash: String,
    pub report_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Insert or replace the review of a daemon.
pub fn put_config_review(conn: &Connection, review: &ConfigReview) -> FleetResult<()> {
    conn.execute(
        "INSERT INTO config_review (daemon_id, config_hash, report_count, created_at) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (daemon_id) DO UPDATE SET config_hash = excluded.config_hash, \
         report_count = excluded.report_count, created_at = excluded.created_at",
        params![
            review.daemon_id,
            review.config_hash,
            review.report_count,
            review.created_at
        ],
    )
    .storage_context(|| format!("failed to store review of daemon {}", review.daemon_id))?;
    Ok(())
}

pub fn get_config_review(conn: &Connection, daemon_id: i64) -> FleetResult<Option<ConfigReview>> {
    conn.query_row(
        "SELECT daemon_id, config_hash, report_count, created_at FROM config_review \
         WHERE daemon_id = ?1",
        params![daemon_id],
        |row| {
            Ok(ConfigReview {
                daemon_id: row.get(0)?,
                config_hash: row.get(1)?,
                report_count: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
    .storage_context(|| format!("failed to get review of daemon {daemon_id}"))
}
