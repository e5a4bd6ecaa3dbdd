use tracing::debug;

use crate::persistence::{PersistedLease, Policy};

use super::host::{HostWorld, TicketKey};
use super::types::{EntityId, RegionCoord};

/// Where an entity stands with respect to its keep-alive lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    Absent,
    Active {
        region: RegionCoord,
    },
    Expiring {
        region: RegionCoord,
        idle_ticks: u32,
        remaining_ticks: u32,
    },
}

/// Owns one entity's keep-alive lease.
///
/// Two counters, each with a single writer: `idle_ticks` changes only through
/// [`notify_active`](Self::notify_active) and [`notify_idle`](Self::notify_idle),
/// `refresh_ticks` only through [`tick`](Self::tick).
#[derive(Debug, Clone)]
pub struct LeaseHandler {
    world_name: String,
    region: RegionCoord,
    ticket: TicketKey,
    idle_ticks: u32,
    refresh_ticks: u32,
    idle_timeout_ticks: u32,
    ticket_duration: u32,
    radius: u32,
}

impl LeaseHandler {
    /// Issues the first directive for `region` immediately.
    pub fn create<W: HostWorld>(
        world: &mut W,
        region: RegionCoord,
        ticket: TicketKey,
        policy: &Policy,
    ) -> Self {
        Self::restore(world, region, 0, ticket, policy)
    }

    /// Rebuilds a lease from a snapshot, keeping its idle progress.
    pub fn restore<W: HostWorld>(
        world: &mut W,
        region: RegionCoord,
        idle_ticks: u32,
        ticket: TicketKey,
        policy: &Policy,
    ) -> Self {
        let handler = Self {
            world_name: world.name().to_string(),
            region,
            ticket,
            idle_ticks: idle_ticks.min(policy.idle_timeout_ticks),
            refresh_ticks: 0,
            idle_timeout_ticks: policy.idle_timeout_ticks,
            ticket_duration: policy.ticket_duration,
            radius: policy.chunk_load_radius,
        };
        handler.issue(world, region);
        handler
    }

    fn issue<W: HostWorld>(&self, world: &mut W, region: RegionCoord) {
        world.issue_keep_alive(region, self.radius, &self.ticket);
    }

    /// Moves the lease when the entity crosses into another region. The new
    /// region is covered on this call, not on the next refresh.
    pub fn update_position<W: HostWorld>(&mut self, world: &mut W, region: RegionCoord) -> bool {
        if region == self.region {
            return false;
        }
        self.issue(world, region);
        debug!(
            world = %self.world_name,
            from = %self.region,
            to = %region,
            "lease_region_changed"
        );
        self.region = region;
        true
    }

    pub fn notify_active(&mut self) {
        self.idle_ticks = 0;
    }

    pub fn notify_idle(&mut self) {
        if self.idle_ticks < self.idle_timeout_ticks {
            self.idle_ticks += 1;
        }
    }

    /// Advances the refresh cycle and re-issues the directive when it rolls
    /// over. Runs regardless of activity. Returns whether a directive was
    /// issued.
    pub fn tick<W: HostWorld>(&mut self, world: &mut W) -> bool {
        self.refresh_ticks += 1;
        if self.refresh_ticks < self.ticket_duration {
            return false;
        }
        self.issue(world, self.region);
        self.refresh_ticks = 0;
        true
    }

    pub fn is_timed_out(&self) -> bool {
        self.idle_ticks >= self.idle_timeout_ticks
    }

    pub fn region(&self) -> RegionCoord {
        self.region
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    pub fn refresh_ticks(&self) -> u32 {
        self.refresh_ticks
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn status(&self) -> LeaseStatus {
        if self.idle_ticks == 0 {
            LeaseStatus::Active {
                region: self.region,
            }
        } else {
            LeaseStatus::Expiring {
                region: self.region,
                idle_ticks: self.idle_ticks,
                remaining_ticks: self.idle_timeout_ticks.saturating_sub(self.idle_ticks),
            }
        }
    }

    pub fn to_persisted_lease(&self, entity: EntityId) -> PersistedLease {
        PersistedLease {
            entity_id: entity.to_string(),
            region_x: self.region.x,
            region_z: self.region.z,
            idle_ticks: self.idle_ticks,
            world_name: self.world_name.clone(),
        }
    }
}
