use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DaemonName;

/// Role a server declares for itself in the HA hook configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaRole {
    Primary,
    Secondary,
    Standby,
    Backup,
}

impl HaRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Standby => "standby",
            Self::Backup => "backup",
        }
    }

    /// Slot of the service record the role occupies. A standby server fills
    /// the secondary slot of a hot-standby pair.
    pub fn slot(self) -> RoleSlot {
        match self {
            Self::Primary => RoleSlot::Primary,
            Self::Secondary | Self::Standby => RoleSlot::Secondary,
            Self::Backup => RoleSlot::Backup,
        }
    }
}

impl Display for HaRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HaRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "standby" => Ok(Self::Standby),
            "backup" => Ok(Self::Backup),
            other => Err(format!("unknown HA role '{other}'")),
        }
    }
}

/// Position a daemon holds in a persisted HA service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleSlot {
    Primary,
    Secondary,
    Backup,
}

/// Outcome of offering a role to a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The slot was empty and now holds the daemon.
    Assigned,
    /// The daemon already held exactly this role.
    AlreadyHeld,
    /// A different daemon holds the slot; it keeps it.
    SlotTaken { holder: i64 },
    /// The daemon already holds another role; it keeps that one.
    HoldsOtherRole { current: RoleSlot },
}

impl Attribution {
    pub fn is_assigned(self) -> bool {
        matches!(self, Self::Assigned)
    }
}

/// HA specific attributes of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaService {
    pub ha_type: DaemonName,
    pub ha_mode: String,
    pub primary_id: Option<i64>,
    pub secondary_id: Option<i64>,
    pub backup_ids: BTreeSet<i64>,
    pub primary_last_state: Option<String>,
    pub secondary_last_state: Option<String>,
    pub primary_status_collected_at: Option<DateTime<Utc>>,
    pub secondary_status_collected_at: Option<DateTime<Utc>>,
}

impl HaService {
    pub fn new(ha_type: DaemonName, ha_mode: impl Into<String>) -> Self {
        Self {
            ha_type,
            ha_mode: ha_mode.into(),
            primary_id: None,
            secondary_id: None,
            backup_ids: BTreeSet::new(),
            primary_last_state: None,
            secondary_last_state: None,
            primary_status_collected_at: None,
            secondary_status_collected_at: None,
        }
    }

    pub fn role_of(&self, daemon_id: i64) -> Option<RoleSlot> {
        if self.primary_id == Some(daemon_id) {
            Some(RoleSlot::Primary)
        } else if self.secondary_id == Some(daemon_id) {
            Some(RoleSlot::Secondary)
        } else if self.backup_ids.contains(&daemon_id) {
            Some(RoleSlot::Backup)
        } else {
            None
        }
    }

    /// Daemons currently holding `slot`.
    pub fn holders(&self, slot: RoleSlot) -> Vec<i64> {
        match slot {
            RoleSlot::Primary => self.primary_id.into_iter().collect(),
            RoleSlot::Secondary => self.secondary_id.into_iter().collect(),
            RoleSlot::Backup => self.backup_ids.iter().copied().collect(),
        }
    }

    /// All daemons holding any role, primary first.
    pub fn attributed_ids(&self) -> Vec<i64> {
        self.primary_id
            .into_iter()
            .chain(self.secondary_id)
            .chain(self.backup_ids.iter().copied())
            .collect()
    }

    /// True when no daemon holds any role.
    pub fn is_blank(&self) -> bool {
        self.primary_id.is_none() && self.secondary_id.is_none() && self.backup_ids.is_empty()
    }

    /// Offer `slot` to a daemon.
    ///
    /// Only empty slots are filled. A daemon that already holds a role is
    /// never moved, and a held primary or secondary slot is never handed to
    /// someone else.
    pub fn attribute(&mut self, slot: RoleSlot, daemon_id: i64) -> Attribution {
        if let Some(current) = self.role_of(daemon_id) {
            return if current == slot {
                Attribution::AlreadyHeld
            } else {
                Attribution::HoldsOtherRole { current }
            };
        }
        let target = match slot {
            RoleSlot::Backup => {
                self.backup_ids.insert(daemon_id);
                return Attribution::Assigned;
            }
            RoleSlot::Primary => &mut self.primary_id,
            RoleSlot::Secondary => &mut self.secondary_id,
        };
        match *target {
            Some(holder) => Attribution::SlotTaken { holder },
            None => {
                *target = Some(daemon_id);
                Attribution::Assigned
            }
        }
    }
}

/// A group of daemons jointly providing a service, currently always HA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    /// `None` until the service has been persisted.
    pub id: Option<i64>,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub ha: HaService,
    /// Member daemons in ascending id order.
    pub daemons: Vec<i64>,
}

impl Service {
    pub fn new(ha: HaService) -> Self {
        Self {
            id: None,
            name: String::new(),
            created_at: None,
            ha,
            daemons: Vec::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn has_member(&self, daemon_id: i64) -> bool {
        self.daemons.contains(&daemon_id)
    }

    /// Add a member, keeping the list sorted. Returns false when the daemon
    /// was already a member.
    pub fn add_member(&mut self, daemon_id: i64) -> bool {
        match self.daemons.binary_search(&daemon_id) {
            Ok(_) => false,
            Err(pos) => {
                self.daemons.insert(pos, daemon_id);
                true
            }
        }
    }
}
