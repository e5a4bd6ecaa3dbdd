use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::persistence::{PersistedLease, Policy};
use crate::tracking::{
    EntityHandle, EntityId, HostServer, HostWorld, LeaseStatus, RegionCoord, TicketNamer,
    TickReport, WorldOrchestrator,
};

/// Outcome of replaying a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped_unknown_world: usize,
    pub skipped_invalid_id: usize,
}

/// Process-wide entry point the host drives from its tick callbacks.
///
/// Holds one [`WorldOrchestrator`] per world, created the first time the
/// world ticks, and the snapshot loaded at startup until it is replayed on
/// the first tick of a world that is not suspended.
pub struct KeepAliveService<E> {
    policy: Policy,
    ticket_namer: Arc<dyn TicketNamer>,
    worlds: BTreeMap<String, WorldOrchestrator<E>>,
    pending_restore: Option<Vec<PersistedLease>>,
}

impl<E: EntityHandle> KeepAliveService<E> {
    pub fn new(policy: Policy, ticket_namer: Arc<dyn TicketNamer>) -> Self {
        Self {
            policy,
            ticket_namer,
            worlds: BTreeMap::new(),
            pending_restore: None,
        }
    }

    /// Queues snapshot entries to be replayed on the first world tick.
    pub fn with_startup_snapshot(mut self, entries: Vec<PersistedLease>) -> Self {
        self.pending_restore = if entries.is_empty() {
            None
        } else {
            Some(entries)
        };
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn has_pending_restore(&self) -> bool {
        self.pending_restore.is_some()
    }

    fn orchestrator_mut(&mut self, world_name: &str) -> &mut WorldOrchestrator<E> {
        let policy = self.policy;
        let ticket_namer = &self.ticket_namer;
        self.worlds
            .entry(world_name.to_string())
            .or_insert_with(|| {
                info!(world = %world_name, "world_tracking_started");
                WorldOrchestrator::new(world_name, policy, Arc::clone(ticket_namer))
            })
    }

    pub fn before_world_tick<S>(&mut self, server: &mut S, world_name: &str) -> bool
    where
        S: HostServer,
        S::World: HostWorld<Entity = E>,
    {
        let Some(world) = server.world_mut(world_name) else {
            warn!(world = %world_name, "world_tick_for_unknown_world");
            return false;
        };
        self.orchestrator_mut(world_name).update_world_idle(world)
    }

    pub fn after_world_tick<S>(&mut self, server: &mut S, world_name: &str) -> TickReport
    where
        S: HostServer,
        S::World: HostWorld<Entity = E>,
    {
        let eligible = self
            .worlds
            .get(world_name)
            .map_or(true, WorldOrchestrator::should_tick);
        if eligible {
            if let Some(entries) = self.pending_restore.take() {
                self.restore(server, &entries);
            }
        }

        let Some(world) = server.world_mut(world_name) else {
            warn!(world = %world_name, "world_tick_for_unknown_world");
            return TickReport::default();
        };
        self.orchestrator_mut(world_name).update_entities(world)
    }

    /// Recreates leases from snapshot entries. Entries naming an unknown world
    /// or carrying a malformed entity id are skipped one by one.
    pub fn restore<S>(&mut self, server: &mut S, entries: &[PersistedLease]) -> RestoreSummary
    where
        S: HostServer,
        S::World: HostWorld<Entity = E>,
    {
        let mut summary = RestoreSummary::default();

        for entry in entries {
            let Some(world) = server.world_mut(&entry.world_name) else {
                warn!(
                    world = %entry.world_name,
                    x = entry.region_x,
                    z = entry.region_z,
                    "snapshot_entry_skipped_unknown_world"
                );
                summary.skipped_unknown_world += 1;
                continue;
            };

            let entity = match EntityId::parse(&entry.entity_id) {
                Ok(entity) => entity,
                Err(error) => {
                    warn!(
                        world = %entry.world_name,
                        x = entry.region_x,
                        z = entry.region_z,
                        entity_id = %entry.entity_id,
                        error = %error,
                        "snapshot_entry_skipped_invalid_id"
                    );
                    summary.skipped_invalid_id += 1;
                    continue;
                }
            };

            let region = RegionCoord::new(entry.region_x, entry.region_z);
            self.orchestrator_mut(&entry.world_name)
                .restore_lease(world, entity, region, entry.idle_ticks);
            summary.restored += 1;
        }

        info!(
            restored = summary.restored,
            skipped_unknown_world = summary.skipped_unknown_world,
            skipped_invalid_id = summary.skipped_invalid_id,
            "snapshot_restored"
        );
        summary
    }

    /// Every live lease across every tracked world.
    pub fn persisted_leases(&self) -> Vec<PersistedLease> {
        self.worlds
            .values()
            .flat_map(WorldOrchestrator::persisted_leases)
            .collect()
    }

    pub fn lease_status(&self, world_name: &str, entity: EntityId) -> LeaseStatus {
        self.worlds
            .get(world_name)
            .map_or(LeaseStatus::Absent, |orchestrator| {
                orchestrator.lease_status(entity)
            })
    }

    pub fn orchestrator(&self, world_name: &str) -> Option<&WorldOrchestrator<E>> {
        self.worlds.get(world_name)
    }

    pub fn tracked_worlds(&self) -> impl Iterator<Item = &str> {
        self.worlds.keys().map(String::as_str)
    }

    pub fn lease_count(&self) -> usize {
        self.worlds.values().map(WorldOrchestrator::lease_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tempfile::TempDir;

    use super::*;
    use crate::persistence::SnapshotStore;
    use crate::tracking::test_support::{FakeCart, FakeServer};
    use crate::tracking::{SharedTicketNamer, Vec3};

    fn service(policy: Policy) -> KeepAliveService<FakeCart> {
        KeepAliveService::new(
            policy,
            Arc::new(SharedTicketNamer::new("am_minecart", policy.ticket_duration)),
        )
    }

    fn tick_all(service: &mut KeepAliveService<FakeCart>, server: &mut FakeServer, worlds: &[&str]) {
        for name in worlds {
            service.before_world_tick(server, name);
            service.after_world_tick(server, name);
        }
    }

    fn as_set(entries: &[PersistedLease]) -> HashSet<PersistedLease> {
        entries.iter().cloned().collect()
    }

    fn entry(id: &str, world: &str, x: i32, z: i32, idle_ticks: u32) -> PersistedLease {
        PersistedLease {
            entity_id: id.to_string(),
            region_x: x,
            region_z: z,
            idle_ticks,
            world_name: world.to_string(),
        }
    }

    #[test]
    fn save_then_restore_reproduces_lease_set() {
        let temp = TempDir::new().expect("temp");
        let store = SnapshotStore::in_dir(temp.path());
        let worlds = ["overworld", "nether"];
        let mut server = FakeServer::with_worlds(&worlds);
        server.world("overworld").spawn(FakeCart::new(
            1,
            Vec3::new(5.0, 64.0, 5.0),
            Vec3::new(2.0, 0.0, 0.0),
        ));
        server.world("overworld").spawn(FakeCart::new(
            2,
            Vec3::new(-40.0, 64.0, 90.0),
            Vec3::new(0.0, 0.0, 1.0),
        ));
        server.world("nether").spawn(FakeCart::new(
            3,
            Vec3::new(100.0, 30.0, -3.0),
            Vec3::new(-1.0, 0.0, 0.0),
        ));

        let mut first = service(Policy::default());
        tick_all(&mut first, &mut server, &worlds);
        for _ in 0..7 {
            tick_all(&mut first, &mut server, &worlds);
        }
        let saved = first.persisted_leases();
        assert_eq!(saved.len(), 3);
        store.save(&saved).expect("save");

        let mut fresh_server = FakeServer::with_worlds(&worlds);
        let mut second = service(Policy::default());
        let loaded = store.load().expect("load").into_entries();
        let summary = second.restore(&mut fresh_server, &loaded);

        assert_eq!(summary.restored, 3);
        assert_eq!(as_set(&second.persisted_leases()), as_set(&saved));
        assert_eq!(fresh_server.world("overworld").issued.len(), 2);
        assert_eq!(fresh_server.world("nether").issued.len(), 1);
    }

    #[test]
    fn restore_skips_unknown_world_and_keeps_the_rest() {
        let mut server = FakeServer::with_worlds(&["overworld"]);
        let mut service = service(Policy::default());
        let entries = vec![
            entry("00000000-0000-0000-0000-000000000001", "overworld", 0, 0, 3),
            entry("00000000-0000-0000-0000-000000000002", "nonexistent", 1, 1, 0),
            entry("00000000-0000-0000-0000-000000000003", "overworld", 2, -2, 9),
        ];

        let summary = service.restore(&mut server, &entries);

        assert_eq!(
            summary,
            RestoreSummary {
                restored: 2,
                skipped_unknown_world: 1,
                skipped_invalid_id: 0,
            }
        );
        let restored = as_set(&service.persisted_leases());
        assert!(restored.contains(&entries[0]));
        assert!(restored.contains(&entries[2]));
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn restore_skips_malformed_entity_id() {
        let mut server = FakeServer::with_worlds(&["overworld"]);
        let mut service = service(Policy::default());
        let entries = vec![
            entry("not-a-uuid", "overworld", 0, 0, 0),
            entry("00000000-0000-0000-0000-000000000004", "overworld", 5, 5, 0),
        ];

        let summary = service.restore(&mut server, &entries);

        assert_eq!(summary.restored, 1);
        assert_eq!(summary.skipped_invalid_id, 1);
        assert_eq!(service.lease_count(), 1);
    }

    #[test]
    fn startup_snapshot_is_replayed_once_on_first_tick() {
        let mut server = FakeServer::with_worlds(&["overworld", "end"]);
        let entries = vec![
            entry("00000000-0000-0000-0000-000000000001", "overworld", 3, 3, 0),
            entry("00000000-0000-0000-0000-000000000002", "end", -1, 0, 0),
        ];
        let mut service = service(Policy::default()).with_startup_snapshot(entries);
        assert!(service.has_pending_restore());

        service.before_world_tick(&mut server, "overworld");
        service.after_world_tick(&mut server, "overworld");

        assert!(!service.has_pending_restore());
        assert_eq!(service.lease_count(), 2);
        assert_eq!(server.world("end").issued_for(RegionCoord::new(-1, 0)), 1);
        assert!(matches!(
            service.lease_status("overworld", EntityId::from_u128(1)),
            LeaseStatus::Expiring { idle_ticks: 1, .. }
        ));
        assert_eq!(
            service.lease_status("end", EntityId::from_u128(2)),
            LeaseStatus::Active {
                region: RegionCoord::new(-1, 0)
            }
        );

        server.world("end").take_issued();
        service.after_world_tick(&mut server, "overworld");
        assert!(server.world("end").issued.is_empty());
    }

    #[test]
    fn startup_snapshot_waits_for_a_world_that_is_not_suspended() {
        let mut server = FakeServer::with_worlds(&["overworld", "end"]);
        server.world("overworld").observers = false;
        let entries = vec![
            entry("00000000-0000-0000-0000-000000000001", "overworld", 3, 3, 0),
            entry("00000000-0000-0000-0000-000000000002", "end", -1, 0, 0),
        ];
        let policy = Policy {
            world_idle_timeout: 0,
            ..Policy::default()
        };
        let mut service = service(policy).with_startup_snapshot(entries);

        assert!(!service.before_world_tick(&mut server, "overworld"));
        let report = service.after_world_tick(&mut server, "overworld");

        assert!(report.suspended);
        assert!(service.has_pending_restore());
        assert_eq!(service.lease_count(), 0);
        assert!(server.world("overworld").issued.is_empty());

        assert!(service.before_world_tick(&mut server, "end"));
        service.after_world_tick(&mut server, "end");

        assert!(!service.has_pending_restore());
        assert_eq!(service.lease_count(), 2);
        assert_eq!(server.world("overworld").issued_for(RegionCoord::new(3, 3)), 1);
    }

    #[test]
    fn empty_startup_snapshot_queues_nothing() {
        let service = service(Policy::default()).with_startup_snapshot(Vec::new());
        assert!(!service.has_pending_restore());
    }

    #[test]
    fn lease_status_for_untracked_world_is_absent() {
        let service = service(Policy::default());
        assert_eq!(
            service.lease_status("overworld", EntityId::from_u128(1)),
            LeaseStatus::Absent
        );
    }

    #[test]
    fn unknown_world_tick_is_ignored() {
        let mut server = FakeServer::with_worlds(&["overworld"]);
        let mut service = service(Policy::default());
        assert!(!service.before_world_tick(&mut server, "missing"));
        assert_eq!(
            service.after_world_tick(&mut server, "missing"),
            TickReport::default()
        );
        assert_eq!(service.tracked_worlds().count(), 0);
    }

    #[test]
    fn worlds_keep_separate_state() {
        let worlds = ["overworld", "nether"];
        let mut server = FakeServer::with_worlds(&worlds);
        server.world("overworld").spawn(FakeCart::new(
            1,
            Vec3::new(0.0, 64.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ));
        let mut service = service(Policy::default());

        tick_all(&mut service, &mut server, &worlds);

        assert_eq!(service.tracked_worlds().collect::<Vec<_>>(), vec!["nether", "overworld"]);
        assert_eq!(service.orchestrator("overworld").expect("overworld").lease_count(), 1);
        assert_eq!(service.orchestrator("nether").expect("nether").lease_count(), 0);
        assert!(server.world("nether").issued.is_empty());
    }
}
