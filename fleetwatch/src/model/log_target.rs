use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::log_allow::is_file_output;

/// One output of one logger declared by a daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogTarget {
    /// `None` until persisted.
    pub id: Option<i64>,
    pub daemon_id: i64,
    pub name: String,
    pub severity: String,
    pub output: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl LogTarget {
    pub fn new(
        daemon_id: i64,
        name: impl Into<String>,
        severity: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            daemon_id,
            name: name.into(),
            severity: severity.into(),
            output: output.into(),
            created_at: None,
        }
    }

    /// Targets are the same across configuration updates when logger name
    /// and output match.
    pub fn same_target(&self, other: &LogTarget) -> bool {
        self.name == other.name && self.output == other.output
    }

    pub fn writes_to_file(&self) -> bool {
        is_file_output(&self.output)
    }
}
