use std::fmt;

use super::types::{EntityId, RegionCoord, Vec3};

/// Read-only view of a mobile entity owned by the host.
///
/// Trackers keep the most recent handle they saw, so `is_permanently_removed`
/// has to keep answering after the entity stops being enumerated.
pub trait EntityHandle: Clone {
    fn id(&self) -> EntityId;
    fn position(&self) -> Vec3;
    fn velocity(&self) -> Vec3;
    fn region_coord(&self) -> RegionCoord;
    fn is_permanently_removed(&self) -> bool;
}

/// One world of the host simulation, as seen from the keep-alive core.
pub trait HostWorld {
    type Entity: EntityHandle;

    /// Stable name used for persistence and world resolution.
    fn name(&self) -> &str;

    /// Entities materialized in this world this tick. Entities in regions the
    /// host is not processing are not returned.
    fn mobile_entities(&self) -> Vec<Self::Entity>;

    fn has_observers(&self) -> bool;

    fn has_forced_regions(&self) -> bool;

    /// Idempotent; issuing again for the same region extends its life.
    fn issue_keep_alive(&mut self, region: RegionCoord, radius: u32, ticket: &TicketKey);
}

/// Resolves worlds by name.
pub trait HostServer {
    type World: HostWorld;

    fn world_mut(&mut self, name: &str) -> Option<&mut Self::World>;
}

/// Key the host groups keep-alive directives under, with the lifetime a
/// directive has before the host lets it lapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TicketKey {
    pub name: String,
    pub lifetime_ticks: u32,
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}t", self.name, self.lifetime_ticks)
    }
}

/// Produces the ticket key leases are issued under for one server run.
pub trait TicketNamer: Send + Sync {
    fn ticket_key(&self, entity: EntityId) -> TicketKey;
}

/// Every lease in the run shares one ticket key.
#[derive(Debug, Clone)]
pub struct SharedTicketNamer {
    key: TicketKey,
}

impl SharedTicketNamer {
    pub fn new(name: impl Into<String>, lifetime_ticks: u32) -> Self {
        Self {
            key: TicketKey {
                name: name.into(),
                lifetime_ticks,
            },
        }
    }
}

impl TicketNamer for SharedTicketNamer {
    fn ticket_key(&self, _entity: EntityId) -> TicketKey {
        self.key.clone()
    }
}

/// One ticket key per entity, `<prefix>_<entity id>`.
#[derive(Debug, Clone)]
pub struct PerEntityTicketNamer {
    prefix: String,
    lifetime_ticks: u32,
}

impl PerEntityTicketNamer {
    pub fn new(prefix: impl Into<String>, lifetime_ticks: u32) -> Self {
        Self {
            prefix: prefix.into(),
            lifetime_ticks,
        }
    }
}

impl TicketNamer for PerEntityTicketNamer {
    fn ticket_key(&self, entity: EntityId) -> TicketKey {
        TicketKey {
            name: format!("{}_{entity}", self.prefix),
            lifetime_ticks: self.lifetime_ticks,
        }
    }
}
