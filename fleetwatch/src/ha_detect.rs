//! Assembles HA services from per-daemon peer facts.
//!
//! Each daemon only knows its own HA configuration, and daemons are usually
//! discovered one at a time. Detection therefore finds the service a daemon
//! belongs to by cross-referencing the peers it declares with daemons that
//! already hold roles, then fills the still empty roles it can resolve.
//! Roles, once held, are never reassigned.

use serde::Serialize;
use tracing::{debug, warn};

use crate::control_url::{parse_url, AccessPoint};
use crate::error::FleetResult;
use crate::extract::{extract_ha_peer_fact, HaPeerFact};
use crate::model::{Attribution, Daemon, DaemonName, HaService, RoleSlot, Service};

/// Read access to persisted state needed by detection.
///
/// Implementations must read from the same transaction the results will be
/// written in, otherwise two concurrent detections can create duplicate
/// services.
pub trait HaDirectory {
    /// Existing services of one HA type, with memberships loaded.
    fn ha_services(&self, ha_type: DaemonName) -> FleetResult<Vec<Service>>;

    /// Control endpoint of the app hosting a daemon.
    fn daemon_access_point(&self, daemon_id: i64) -> FleetResult<Option<AccessPoint>>;

    /// Daemon of the given kind in the app reachable at `access_point`.
    fn find_daemon(&self, access_point: &AccessPoint, name: DaemonName) -> FleetResult<Option<i64>>;

    /// Service of the given HA type the daemon is a member of.
    fn daemon_service(&self, daemon_id: i64, ha_type: DaemonName) -> FleetResult<Option<i64>>;
}

/// A service as it should look after detection for one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceResult {
    /// The merged service; `daemons` holds the full membership.
    pub service: Service,
    /// The service does not exist yet and must be inserted.
    pub is_new: bool,
    /// Members that are not persisted as members yet.
    pub added_members: Vec<i64>,
    /// HA attributes differ from the persisted ones.
    pub changed: bool,
}

impl ServiceResult {
    /// Whether applying the result writes anything.
    pub fn needs_write(&self) -> bool {
        self.is_new || self.changed || !self.added_members.is_empty()
    }
}

/// Detect the HA service of a daemon from its current configuration.
///
/// Returns nothing for daemons without an HA configuration.
pub fn detect_ha_services(dir: &dyn HaDirectory, daemon: &Daemon) -> FleetResult<Vec<ServiceResult>> {
    match extract_ha_peer_fact(daemon) {
        Some(fact) => detect_from_fact(dir, daemon.id, &fact),
        None => Ok(Vec::new()),
    }
}

/// Detect the HA service for a daemon whose fact was extracted beforehand.
///
/// At most one service per HA type is returned. A service the daemon is
/// already a member of is preferred; otherwise, when several existing
/// services would match, the first in id order wins.
pub fn detect_from_fact(
    dir: &dyn HaDirectory,
    daemon_id: i64,
    fact: &HaPeerFact,
) -> FleetResult<Vec<ServiceResult>> {
    let mut services = dir.ha_services(fact.ha_type)?;
    let mut matched = services
        .iter()
        .position(|s| s.has_member(daemon_id) || s.ha.role_of(daemon_id).is_some());
    if matched.is_none() {
        for (index, service) in services.iter().enumerate() {
            if belongs_to_service(dir, daemon_id, fact, service)? {
                matched = Some(index);
                break;
            }
        }
    }
    let matched = matched.map(|index| services.swap_remove(index));

    let (service, is_new) = match matched {
        Some(service) => (service, false),
        None => (
            Service::new(HaService::new(fact.ha_type, fact.mode.clone())),
            true,
        ),
    };
    let result = merge_fact(dir, service, is_new, daemon_id, fact)?;
    debug!(
        daemon_id,
        ha_type = %fact.ha_type,
        is_new = result.is_new,
        changed = result.changed,
        added = result.added_members.len(),
        "detected HA service"
    );
    Ok(vec![result])
}

/// Whether a daemon is already part of `service`.
///
/// True when the daemon is a member or holds a role, or when one of its
/// declared peers resolves to a daemon holding the role that peer declares.
/// A service nobody holds a role in can only be joined explicitly.
pub fn belongs_to_service(
    dir: &dyn HaDirectory,
    daemon_id: i64,
    fact: &HaPeerFact,
    service: &Service,
) -> FleetResult<bool> {
    if service.has_member(daemon_id) || service.ha.role_of(daemon_id).is_some() {
        return Ok(true);
    }
    for peer in fact.other_peers() {
        for holder in service.ha.holders(peer.role.slot()) {
            if holder == daemon_id {
                continue;
            }
            let Some(access_point) = dir.daemon_access_point(holder)? else {
                continue;
            };
            if access_point.matches_url(&peer.url) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn merge_fact(
    dir: &dyn HaDirectory,
    mut service: Service,
    is_new: bool,
    daemon_id: i64,
    fact: &HaPeerFact,
) -> FleetResult<ServiceResult> {
    let mut changed = is_new;
    if service.ha.ha_mode.is_empty() && !fact.mode.is_empty() {
        service.ha.ha_mode = fact.mode.clone();
        changed = true;
    }

    changed |= offer_role(&mut service, fact.this_server_role.slot(), daemon_id);

    for peer in fact.other_peers() {
        let Some(access_point) = parse_url(&peer.url) else {
            debug!(peer = %peer.name, url = %peer.url, "cannot parse HA peer URL");
            continue;
        };
        let Some(peer_id) = dir.find_daemon(&access_point, fact.ha_type)? else {
            continue;
        };
        if peer_id == daemon_id {
            continue;
        }
        if let Some(other) = dir.daemon_service(peer_id, fact.ha_type)? {
            if service.id != Some(other) {
                warn!(
                    service_id = ?service.id,
                    daemon_id,
                    peer_id,
                    other_service_id = other,
                    "HA peer already belongs to another service, leaving its role empty"
                );
                continue;
            }
        }
        changed |= offer_role(&mut service, peer.role.slot(), peer_id);
    }

    let mut added_members = Vec::new();
    for holder in service.ha.attributed_ids() {
        if service.add_member(holder) {
            added_members.push(holder);
        }
    }

    Ok(ServiceResult {
        service,
        is_new,
        added_members,
        changed,
    })
}

fn offer_role(service: &mut Service, slot: RoleSlot, daemon_id: i64) -> bool {
    match service.ha.attribute(slot, daemon_id) {
        Attribution::Assigned => true,
        Attribution::AlreadyHeld => false,
        Attribution::SlotTaken { holder } => {
            warn!(
                service_id = ?service.id,
                daemon_id,
                holder,
                ?slot,
                "HA role already held by another daemon, keeping the first one"
            );
            false
        }
        Attribution::HoldsOtherRole { current } => {
            warn!(
                service_id = ?service.id,
                daemon_id,
                ?current,
                claimed = ?slot,
                "daemon claims a different HA role than it holds, keeping the held one"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::{belongs_to_service, detect_ha_services, HaDirectory};
    use crate::control_url::AccessPoint;
    use crate::error::FleetResult;
    use crate::kea_config::KeaConfig;
    use crate::model::{Daemon, DaemonName, HaService, Service};

    /// In-memory directory: daemon id -> (access point, name).
    #[derive(Default)]
    struct Directory {
        daemons: HashMap<i64, (AccessPoint, DaemonName)>,
        services: Vec<Service>,
    }

    impl Directory {
        fn add(&mut self, id: i64, host: &str, name: DaemonName) {
            self.daemons
                .insert(id, (AccessPoint::new(host, 8000, false), name));
        }
    }

    impl HaDirectory for Directory {
        fn ha_services(&self, ha_type: DaemonName) -> FleetResult<Vec<Service>> {
            Ok(self
                .services
                .iter()
                .filter(|s| s.ha.ha_type == ha_type)
                .cloned()
                .collect())
        }

        fn daemon_access_point(&self, daemon_id: i64) -> FleetResult<Option<AccessPoint>> {
            Ok(self.daemons.get(&daemon_id).map(|(ap, _)| ap.clone()))
        }

        fn find_daemon(
            &self,
            access_point: &AccessPoint,
            name: DaemonName,
        ) -> FleetResult<Option<i64>> {
            Ok(self
                .daemons
                .iter()
                .find(|(_, (ap, n))| ap.same_endpoint(access_point) && *n == name)
                .map(|(id, _)| *id))
        }

        fn daemon_service(&self, daemon_id: i64, ha_type: DaemonName) -> FleetResult<Option<i64>> {
            Ok(self
                .services
                .iter()
                .find(|s| s.ha.ha_type == ha_type && s.has_member(daemon_id))
                .and_then(|s| s.id))
        }
    }

    fn daemon(id: i64, this_server: &str) -> Daemon {
        let text = format!(
            r#"{{"Dhcp4": {{"hooks-libraries": [{{"library": "libdhcp_ha.so", "parameters": {{
                "high-availability": [{{"this-server-name": "{this_server}", "mode": "load-balancing",
                "peers": [
                    {{"name": "server1", "url": "http://192.0.2.33:8000/", "role": "primary"}},
                    {{"name": "server2", "url": "http://192.0.2.66:8000/", "role": "secondary"}},
                    {{"name": "server4", "url": "http://192.0.2.133:8000/", "role": "backup"}}
                ]}}]}}}}]}}}}"#
        );
        let mut daemon = Daemon::new(id, id, DaemonName::Dhcp4);
        daemon.set_config(Arc::new(KeaConfig::from_json(&text).expect("config")));
        daemon
    }

    /// Persist a detection result the way the store would.
    fn apply(dir: &mut Directory, mut service: Service) {
        match service.id {
            Some(id) => {
                if let Some(existing) = dir.services.iter_mut().find(|s| s.id == Some(id)) {
                    *existing = service;
                }
            }
            None => {
                service.id = Some(dir.services.len() as i64 + 1);
                dir.services.push(service);
            }
        }
    }

    #[test]
    fn first_daemon_creates_service_with_its_own_role() {
        let mut dir = Directory::default();
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);

        let results = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.is_new);
        assert!(result.changed);
        assert_eq!(result.service.ha.secondary_id, Some(2));
        assert_eq!(result.service.ha.primary_id, None);
        assert_eq!(result.service.ha.ha_mode, "load-balancing");
        assert_eq!(result.service.daemons, vec![2]);
        assert_eq!(result.added_members, vec![2]);
    }

    #[test]
    fn peers_known_at_creation_are_attributed() {
        let mut dir = Directory::default();
        dir.add(1, "192.0.2.33", DaemonName::Dhcp4);
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        dir.add(3, "192.0.2.133", DaemonName::Dhcp6);

        let results = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        let ha = &results[0].service.ha;
        assert_eq!(ha.primary_id, Some(1));
        assert_eq!(ha.secondary_id, Some(2));
        assert!(ha.backup_ids.is_empty());
    }

    #[test]
    fn gradual_discovery_builds_one_service() {
        let mut dir = Directory::default();
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        let first = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        apply(&mut dir, first[0].service.clone());

        dir.add(4, "192.0.2.133", DaemonName::Dhcp4);
        let second = detect_ha_services(&dir, &daemon(4, "server4")).expect("detect");
        assert!(!second[0].is_new);
        assert_eq!(second[0].service.ha.backup_ids.iter().copied().collect::<Vec<_>>(), vec![4]);
        assert_eq!(second[0].added_members, vec![4]);
        apply(&mut dir, second[0].service.clone());

        dir.add(1, "192.0.2.33", DaemonName::Dhcp4);
        let third = detect_ha_services(&dir, &daemon(1, "server1")).expect("detect");
        assert!(!third[0].is_new);
        apply(&mut dir, third[0].service.clone());

        assert_eq!(dir.services.len(), 1);
        let ha = &dir.services[0].ha;
        assert_eq!(ha.primary_id, Some(1));
        assert_eq!(ha.secondary_id, Some(2));
        assert!(ha.backup_ids.contains(&4));
        assert_eq!(dir.services[0].daemons, vec![1, 2, 4]);

        for (id, name) in [(1, "server1"), (2, "server2"), (4, "server4")] {
            let again = detect_ha_services(&dir, &daemon(id, name)).expect("detect");
            assert!(!again[0].needs_write(), "daemon {id} re-detection must be a no-op");
        }
    }

    #[test]
    fn held_roles_are_never_reassigned() {
        let mut dir = Directory::default();
        dir.add(1, "192.0.2.33", DaemonName::Dhcp4);
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        let first = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        apply(&mut dir, first[0].service.clone());

        // Daemon 9 claims to be server1 (primary) at a different address.
        dir.add(9, "192.0.2.99", DaemonName::Dhcp4);
        let result = detect_ha_services(&dir, &daemon(9, "server1")).expect("detect");
        assert_eq!(result[0].service.ha.primary_id, Some(1));
        assert!(!result[0].service.has_member(9));

        // Daemon 2 later claims the primary role; it stays secondary.
        let flipped = detect_ha_services(&dir, &daemon(2, "server1")).expect("detect");
        assert_eq!(flipped[0].service.ha.secondary_id, Some(2));
        assert_eq!(flipped[0].service.ha.primary_id, Some(1));
    }

    #[test]
    fn blank_service_is_never_matched() {
        let mut dir = Directory::default();
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        let mut blank = Service::new(HaService::new(DaemonName::Dhcp4, ""));
        blank.id = Some(1);
        dir.services.push(blank.clone());

        let fact = crate::extract::extract_ha_peer_fact(&daemon(2, "server2")).expect("fact");
        assert!(!belongs_to_service(&dir, 2, &fact, &blank).expect("belongs"));
        let results = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        assert!(results[0].is_new);
    }

    #[test]
    fn explicit_member_of_blank_service_belongs_to_it() {
        let mut dir = Directory::default();
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        let mut blank = Service::new(HaService::new(DaemonName::Dhcp4, ""));
        blank.id = Some(1);
        blank.add_member(2);
        dir.services.push(blank);

        let results = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        let result = &results[0];
        assert!(!result.is_new);
        assert!(result.changed);
        assert_eq!(result.service.ha.secondary_id, Some(2));
        assert_eq!(result.service.ha.ha_mode, "load-balancing");
        assert!(result.added_members.is_empty());
    }

    #[test]
    fn peer_in_another_service_is_left_unattributed() {
        let mut dir = Directory::default();
        dir.add(1, "192.0.2.33", DaemonName::Dhcp4);
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        let mut blank = Service::new(HaService::new(DaemonName::Dhcp4, ""));
        blank.id = Some(1);
        blank.add_member(1);
        dir.services.push(blank);

        let results = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        let result = &results[0];
        assert!(result.is_new);
        assert_eq!(result.service.ha.secondary_id, Some(2));
        assert_eq!(result.service.ha.primary_id, None);
        assert_eq!(result.service.daemons, vec![2]);
        assert_eq!(result.added_members, vec![2]);
    }

    #[test]
    fn own_service_is_preferred_over_peer_evidence() {
        let mut dir = Directory::default();
        dir.add(2, "192.0.2.66", DaemonName::Dhcp4);
        let first = detect_ha_services(&dir, &daemon(2, "server2")).expect("detect");
        apply(&mut dir, first[0].service.clone());

        // Daemon 1 was added to a blank service before it reported.
        dir.add(1, "192.0.2.33", DaemonName::Dhcp4);
        let mut blank = Service::new(HaService::new(DaemonName::Dhcp4, ""));
        blank.id = Some(2);
        blank.add_member(1);
        dir.services.push(blank);

        let results = detect_ha_services(&dir, &daemon(1, "server1")).expect("detect");
        let result = &results[0];
        assert_eq!(result.service.id, Some(2));
        assert_eq!(result.service.ha.primary_id, Some(1));
        assert_eq!(result.service.ha.secondary_id, None);
        assert_eq!(result.service.daemons, vec![1]);
    }

    #[test]
    fn daemons_without_ha_yield_nothing() {
        let dir = Directory::default();
        let daemon = Daemon::new(1, 1, DaemonName::Dhcp4);
        assert!(detect_ha_services(&dir, &daemon).expect("detect").is_empty());
    }
}
