use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use cartkeep::{EntityHandle, EntityId, HostServer, HostWorld, RegionCoord, TicketKey, Vec3};
use tracing::{debug, info};

/// World units per region along each horizontal axis.
pub(crate) const REGION_SIZE: u32 = 16;
/// Regions around an observer that the host keeps processed.
const OBSERVER_VIEW_RADIUS: i32 = 4;
/// Ticks without observers or forced regions before the host stops moving
/// entities in a world.
const HOST_DORMANCY_TICKS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Motion {
    /// Constant velocity until `until_tick`, then at rest.
    Travel { velocity: Vec3, until_tick: u64 },
    /// Back and forth along x around the spawn point.
    Oscillate { amplitude: f64, step: f64 },
    Rest,
}

#[derive(Debug)]
pub(crate) struct SimCart {
    id: EntityId,
    position: Vec3,
    velocity: Vec3,
    origin: Vec3,
    motion: Motion,
    destroy_at_tick: Option<u64>,
    removed: Rc<Cell<bool>>,
}

impl SimCart {
    pub(crate) fn new(id: EntityId, position: Vec3, motion: Motion) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            origin: position,
            motion,
            destroy_at_tick: None,
            removed: Rc::new(Cell::new(false)),
        }
    }

    pub(crate) fn destroyed_at(mut self, tick: u64) -> Self {
        self.destroy_at_tick = Some(tick);
        self
    }

    fn region(&self) -> RegionCoord {
        RegionCoord::containing(self.position, REGION_SIZE)
    }

    fn step(&mut self, tick: u64) {
        let next = match self.motion {
            Motion::Travel {
                velocity,
                until_tick,
            } if tick < until_tick => self.position + velocity,
            Motion::Oscillate { amplitude, step } => {
                let mut x = self.position.x + step;
                if (x - self.origin.x).abs() > amplitude {
                    self.motion = Motion::Oscillate {
                        amplitude,
                        step: -step,
                    };
                    x = self.position.x - step;
                }
                Vec3::new(x, self.position.y, self.position.z)
            }
            Motion::Travel { .. } | Motion::Rest => self.position,
        };
        self.velocity = next - self.position;
        self.position = next;
    }

    fn handle(&self) -> SimCartHandle {
        SimCartHandle {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            removed: Rc::clone(&self.removed),
        }
    }
}

/// What the keep-alive core sees of a cart: a copy of this tick's motion plus
/// a live removal flag.
#[derive(Debug, Clone)]
pub(crate) struct SimCartHandle {
    id: EntityId,
    position: Vec3,
    velocity: Vec3,
    removed: Rc<Cell<bool>>,
}

impl EntityHandle for SimCartHandle {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn region_coord(&self) -> RegionCoord {
        RegionCoord::containing(self.position, REGION_SIZE)
    }

    fn is_permanently_removed(&self) -> bool {
        self.removed.get()
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveTicket {
    radius: u32,
    expires_at_tick: u64,
}

#[derive(Debug)]
pub(crate) struct SimWorld {
    name: String,
    tick: u64,
    carts: Vec<SimCart>,
    observers_until_tick: Option<u64>,
    forced_regions: Vec<RegionCoord>,
    tickets: HashMap<RegionCoord, LiveTicket>,
    directives_issued: u64,
    unattended_ticks: u64,
}

impl SimWorld {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tick: 0,
            carts: Vec::new(),
            observers_until_tick: None,
            forced_regions: Vec::new(),
            tickets: HashMap::new(),
            directives_issued: 0,
            unattended_ticks: 0,
        }
    }

    pub(crate) fn with_observers_until(mut self, tick: u64) -> Self {
        self.observers_until_tick = Some(tick);
        self
    }

    pub(crate) fn with_cart(mut self, cart: SimCart) -> Self {
        self.carts.push(cart);
        self
    }

    pub(crate) fn directives_issued(&self) -> u64 {
        self.directives_issued
    }

    pub(crate) fn live_ticket_count(&self) -> usize {
        self.tickets.len()
    }

    fn observers_present(&self) -> bool {
        self.observers_until_tick
            .is_some_and(|until_tick| self.tick < until_tick)
    }

    fn is_processed(&self, region: RegionCoord) -> bool {
        let near = |center: RegionCoord, radius: i32| {
            (region.x - center.x).abs() <= radius && (region.z - center.z).abs() <= radius
        };
        if self.observers_present() && near(RegionCoord::default(), OBSERVER_VIEW_RADIUS) {
            return true;
        }
        if self.forced_regions.iter().any(|forced| near(*forced, 0)) {
            return true;
        }
        self.tickets
            .iter()
            .any(|(center, ticket)| near(*center, ticket.radius as i32))
    }

    pub(crate) fn is_dormant(&self) -> bool {
        self.unattended_ticks > HOST_DORMANCY_TICKS
    }

    /// Advances host-side state for `tick`: expires lapsed tickets, removes
    /// carts scheduled for destruction and moves carts in processed regions
    /// unless the world has gone dormant.
    pub(crate) fn step(&mut self, tick: u64) {
        self.tick = tick;
        self.tickets
            .retain(|_, ticket| ticket.expires_at_tick >= tick);
        if self.observers_present() || !self.forced_regions.is_empty() {
            self.unattended_ticks = 0;
        } else {
            self.unattended_ticks += 1;
        }

        let world_name = &self.name;
        self.carts.retain(|cart| match cart.destroy_at_tick {
            Some(at) if tick >= at => {
                cart.removed.set(true);
                info!(world = %world_name, entity = %cart.id, "sim_cart_destroyed");
                false
            }
            _ => true,
        });

        let dormant = self.is_dormant();
        let processed = self
            .carts
            .iter()
            .map(|cart| !dormant && self.is_processed(cart.region()))
            .collect::<Vec<_>>();
        for (cart, processed) in self.carts.iter_mut().zip(processed) {
            if processed {
                cart.step(tick);
            } else {
                cart.velocity = Vec3::ZERO;
            }
        }
    }
}

impl HostWorld for SimWorld {
    type Entity = SimCartHandle;

    fn name(&self) -> &str {
        &self.name
    }

    fn mobile_entities(&self) -> Vec<SimCartHandle> {
        self.carts
            .iter()
            .filter(|cart| self.is_processed(cart.region()))
            .map(SimCart::handle)
            .collect()
    }

    fn has_observers(&self) -> bool {
        self.observers_present()
    }

    fn has_forced_regions(&self) -> bool {
        !self.forced_regions.is_empty()
    }

    fn issue_keep_alive(&mut self, region: RegionCoord, radius: u32, ticket: &TicketKey) {
        let expires_at_tick = self.tick + u64::from(ticket.lifetime_ticks);
        self.tickets.insert(
            region,
            LiveTicket {
                radius,
                expires_at_tick,
            },
        );
        self.directives_issued += 1;
        debug!(
            world = %self.name,
            region = %region,
            radius,
            ticket = %ticket,
            expires_at_tick,
            "sim_keep_alive_issued"
        );
    }
}

#[derive(Debug, Default)]
pub(crate) struct SimServer {
    worlds: Vec<SimWorld>,
}

impl SimServer {
    pub(crate) fn new(worlds: Vec<SimWorld>) -> Self {
        Self { worlds }
    }

    pub(crate) fn world_names(&self) -> Vec<String> {
        self.worlds.iter().map(|world| world.name.clone()).collect()
    }

    pub(crate) fn worlds(&self) -> &[SimWorld] {
        &self.worlds
    }
}

impl HostServer for SimServer {
    type World = SimWorld;

    fn world_mut(&mut self, name: &str) -> Option<&mut SimWorld> {
        self.worlds.iter_mut().find(|world| world.name == name)
    }
}

/// Two worlds: an overworld whose only observer logs off at tick 2000, with a
/// long-haul cart, a cart rocking in place and a cart that gets destroyed;
/// and a nether nobody visits.
pub(crate) fn demo_server() -> SimServer {
    let overworld = SimWorld::new("minecraft:overworld")
        .with_observers_until(2000)
        .with_cart(SimCart::new(
            EntityId::from_u128(0xa1),
            Vec3::new(8.0, 64.0, 8.0),
            Motion::Travel {
                velocity: Vec3::new(0.4, 0.0, 0.0),
                until_tick: 4000,
            },
        ))
        .with_cart(SimCart::new(
            EntityId::from_u128(0xa2),
            Vec3::new(-20.0, 64.0, 12.0),
            Motion::Oscillate {
                amplitude: 1.0,
                step: 0.5,
            },
        ))
        .with_cart(
            SimCart::new(
                EntityId::from_u128(0xa3),
                Vec3::new(4.0, 64.0, -30.0),
                Motion::Travel {
                    velocity: Vec3::new(0.0, 0.0, -0.6),
                    until_tick: u64::MAX,
                },
            )
            .destroyed_at(1500),
        );

    let nether = SimWorld::new("minecraft:the_nether").with_cart(SimCart::new(
        EntityId::from_u128(0xb1),
        Vec3::new(0.0, 40.0, 0.0),
        Motion::Rest,
    ));

    SimServer::new(vec![overworld, nether])
}
