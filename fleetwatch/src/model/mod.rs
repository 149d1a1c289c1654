//! Entities tracked by the state engine.

mod daemon;
mod log_target;
mod service;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::control_url::AccessPoint;

pub use daemon::Daemon;
pub use log_target::LogTarget;
pub use service::{Attribution, HaRole, HaService, RoleSlot, Service};

/// Kind of monitored daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonName {
    Dhcp4,
    Dhcp6,
    Named,
}

impl DaemonName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dhcp4 => "dhcp4",
            Self::Dhcp6 => "dhcp6",
            Self::Named => "named",
        }
    }

    /// Whether daemons of this kind can run the HA hook.
    pub fn supports_ha(self) -> bool {
        matches!(self, Self::Dhcp4 | Self::Dhcp6)
    }
}

impl Display for DaemonName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dhcp4" => Ok(Self::Dhcp4),
            "dhcp6" => Ok(Self::Dhcp6),
            "named" => Ok(Self::Named),
            other => Err(format!("unknown daemon name '{other}'")),
        }
    }
}

/// Application hosting one or more daemons behind a control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    pub access_point: AccessPoint,
    pub created_at: DateTime<Utc>,
}
