use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::persistence::{PersistedLease, Policy};

use super::activity::ActivityTracker;
use super::host::{EntityHandle, HostWorld, TicketNamer};
use super::lease::{LeaseHandler, LeaseStatus};
use super::types::{EntityId, RegionCoord};

/// Follows the host's own dormancy rule: a world with no observers and no
/// forced regions keeps ticking for `timeout` more ticks, then freezes until
/// an observer or a forced region shows up again.
#[derive(Debug, Clone)]
pub struct WorldIdleGate {
    idle_counter: u32,
    should_tick: bool,
    timeout: u32,
}

impl WorldIdleGate {
    pub fn new(timeout: u32) -> Self {
        Self {
            idle_counter: 0,
            should_tick: true,
            timeout,
        }
    }

    pub fn update(&mut self, has_observers: bool, has_forced_regions: bool) -> bool {
        let nothing_to_load = !has_observers && !has_forced_regions;
        if !nothing_to_load {
            self.idle_counter = 0;
        }

        self.should_tick = if nothing_to_load {
            let within_grace = self.idle_counter < self.timeout;
            self.idle_counter = self.idle_counter.saturating_add(1);
            within_grace
        } else {
            true
        };
        self.should_tick
    }

    pub fn should_tick(&self) -> bool {
        self.should_tick
    }
}

/// What one `update_entities` pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub suspended: bool,
    pub entities_seen: usize,
    pub leases_created: usize,
    pub leases_timed_out: usize,
    pub leases_dropped: usize,
}

/// Per-world root of the keep-alive state.
pub struct WorldOrchestrator<E> {
    world_name: String,
    policy: Policy,
    ticket_namer: Arc<dyn TicketNamer>,
    gate: WorldIdleGate,
    trackers: HashMap<EntityId, ActivityTracker<E>>,
    leases: HashMap<EntityId, LeaseHandler>,
}

impl<E: EntityHandle> WorldOrchestrator<E> {
    pub fn new(
        world_name: impl Into<String>,
        policy: Policy,
        ticket_namer: Arc<dyn TicketNamer>,
    ) -> Self {
        Self {
            world_name: world_name.into(),
            gate: WorldIdleGate::new(policy.world_idle_timeout),
            policy,
            ticket_namer,
            trackers: HashMap::new(),
            leases: HashMap::new(),
        }
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    /// Called at the start of each world tick.
    pub fn update_world_idle<W: HostWorld<Entity = E>>(&mut self, world: &W) -> bool {
        let was_ticking = self.gate.should_tick();
        let should_tick = self
            .gate
            .update(world.has_observers(), world.has_forced_regions());
        if was_ticking && !should_tick {
            info!(
                world = %self.world_name,
                trackers = self.trackers.len(),
                leases = self.leases.len(),
                "world_suspended"
            );
        } else if !was_ticking && should_tick {
            info!(world = %self.world_name, "world_resumed");
        }
        should_tick
    }

    pub fn should_tick(&self) -> bool {
        self.gate.should_tick()
    }

    /// Called at the end of each world tick. Does nothing while the world is
    /// suspended, so no tracker or lease counter advances.
    ///
    /// Every tracker is updated before any lease is touched.
    pub fn update_entities<W: HostWorld<Entity = E>>(&mut self, world: &mut W) -> TickReport {
        if !self.gate.should_tick() {
            return TickReport {
                suspended: true,
                ..TickReport::default()
            };
        }

        let Self {
            world_name,
            policy,
            ticket_namer,
            trackers,
            leases,
            ..
        } = self;
        let mut report = TickReport::default();

        for entity in world.mobile_entities() {
            report.entities_seen += 1;
            match trackers.entry(entity.id()) {
                Entry::Occupied(mut slot) => slot.get_mut().update(entity, policy),
                Entry::Vacant(slot) => {
                    slot.insert(ActivityTracker::new(entity, policy));
                }
            }
        }

        trackers.retain(|id, tracker| {
            if tracker.entity().is_permanently_removed() {
                if leases.remove(id).is_some() {
                    report.leases_dropped += 1;
                    info!(world = %world_name, entity = %id, "lease_dropped_entity_removed");
                }
                return false;
            }

            // Not enumerated this tick but still exists: freeze the tracker and
            // let the lease run down its idle timer.
            if !tracker.take_touched() {
                if let Some(lease) = leases.get_mut(id) {
                    lease.notify_idle();
                }
                return true;
            }

            let active = tracker.is_active();
            let region = tracker.entity().region_coord();
            if active {
                if let Entry::Vacant(slot) = leases.entry(*id) {
                    let ticket = ticket_namer.ticket_key(*id);
                    slot.insert(LeaseHandler::create(world, region, ticket, policy));
                    report.leases_created += 1;
                    info!(world = %world_name, entity = %id, region = %region, "lease_created");
                }
            }

            if let Some(lease) = leases.get_mut(id) {
                lease.update_position(world, region);
                if active {
                    lease.notify_active();
                } else {
                    lease.notify_idle();
                }
            }
            true
        });

        leases.retain(|id, lease| {
            if !trackers.contains_key(id) {
                lease.notify_idle();
            }
            lease.tick(world);
            if lease.is_timed_out() {
                report.leases_timed_out += 1;
                info!(
                    world = %world_name,
                    entity = %id,
                    region = %lease.region(),
                    "lease_timed_out"
                );
                return false;
            }
            true
        });

        report
    }

    /// Recreates a lease from a snapshot without waiting for the entity to be
    /// seen moving again.
    pub fn restore_lease<W: HostWorld<Entity = E>>(
        &mut self,
        world: &mut W,
        entity: EntityId,
        region: RegionCoord,
        idle_ticks: u32,
    ) {
        let ticket = self.ticket_namer.ticket_key(entity);
        let lease = LeaseHandler::restore(world, region, idle_ticks, ticket, &self.policy);
        debug!(
            world = %self.world_name,
            entity = %entity,
            region = %region,
            idle_ticks = lease.idle_ticks(),
            "lease_restored"
        );
        self.leases.insert(entity, lease);
    }

    pub fn persisted_leases(&self) -> Vec<PersistedLease> {
        self.leases
            .iter()
            .map(|(id, lease)| lease.to_persisted_lease(*id))
            .collect()
    }

    pub fn lease_status(&self, entity: EntityId) -> LeaseStatus {
        self.leases
            .get(&entity)
            .map_or(LeaseStatus::Absent, LeaseHandler::status)
    }

    pub fn lease(&self, entity: EntityId) -> Option<&LeaseHandler> {
        self.leases.get(&entity)
    }

    pub fn tracker(&self, entity: EntityId) -> Option<&ActivityTracker<E>> {
        self.trackers.get(&entity)
    }

    pub fn tracked_entity_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }
}
