use std::cell::Cell;
use std::rc::Rc;

use super::host::{EntityHandle, HostServer, HostWorld, TicketKey};
use super::types::{EntityId, RegionCoord, Vec3};

pub(crate) const REGION_SIZE: u32 = 16;

#[derive(Debug, Clone)]
pub(crate) struct FakeCart {
    pub id: EntityId,
    pub position: Vec3,
    pub velocity: Vec3,
    removed: Rc<Cell<bool>>,
}

impl FakeCart {
    pub fn new(id: u128, position: Vec3, velocity: Vec3) -> Self {
        Self {
            id: EntityId::from_u128(id),
            position,
            velocity,
            removed: Rc::new(Cell::new(false)),
        }
    }
}

impl EntityHandle for FakeCart {
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

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IssuedDirective {
    pub region: RegionCoord,
    pub radius: u32,
    pub ticket: TicketKey,
}

#[derive(Debug)]
pub(crate) struct FakeWorld {
    pub name: String,
    pub carts: Vec<FakeCart>,
    pub observers: bool,
    pub forced_regions: bool,
    pub issued: Vec<IssuedDirective>,
}

impl FakeWorld {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            carts: Vec::new(),
            observers: true,
            forced_regions: false,
            issued: Vec::new(),
        }
    }

    pub fn spawn(&mut self, cart: FakeCart) {
        self.carts.push(cart);
    }

    /// Sets a cart's new position, with velocity equal to the displacement.
    pub fn move_to(&mut self, id: u128, position: Vec3) {
        let id = EntityId::from_u128(id);
        if let Some(cart) = self.carts.iter_mut().find(|cart| cart.id == id) {
            cart.velocity = position - cart.position;
            cart.position = position;
        }
    }

    /// Stops enumerating a cart without removing it.
    pub fn unload(&mut self, id: u128) -> Option<FakeCart> {
        let id = EntityId::from_u128(id);
        let index = self.carts.iter().position(|cart| cart.id == id)?;
        Some(self.carts.remove(index))
    }

    pub fn destroy(&mut self, id: u128) {
        if let Some(cart) = self.unload(id) {
            cart.removed.set(true);
        }
    }

    pub fn issued_for(&self, region: RegionCoord) -> usize {
        self.issued
            .iter()
            .filter(|directive| directive.region == region)
            .count()
    }

    pub fn take_issued(&mut self) -> Vec<IssuedDirective> {
        std::mem::take(&mut self.issued)
    }
}

impl HostWorld for FakeWorld {
    type Entity = FakeCart;

    fn name(&self) -> &str {
        &self.name
    }

    fn mobile_entities(&self) -> Vec<FakeCart> {
        self.carts.clone()
    }

    fn has_observers(&self) -> bool {
        self.observers
    }

    fn has_forced_regions(&self) -> bool {
        self.forced_regions
    }

    fn issue_keep_alive(&mut self, region: RegionCoord, radius: u32, ticket: &TicketKey) {
        self.issued.push(IssuedDirective {
            region,
            radius,
            ticket: ticket.clone(),
        });
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeServer {
    pub worlds: Vec<FakeWorld>,
}

impl FakeServer {
    pub fn with_worlds(names: &[&str]) -> Self {
        Self {
            worlds: names.iter().map(|name| FakeWorld::new(name)).collect(),
        }
    }

    pub fn world(&mut self, name: &str) -> &mut FakeWorld {
        self.worlds
            .iter_mut()
            .find(|world| world.name == name)
            .unwrap_or_else(|| panic!("no fake world named {name}"))
    }
}

impl HostServer for FakeServer {
    type World = FakeWorld;

    fn world_mut(&mut self, name: &str) -> Option<&mut FakeWorld> {
        self.worlds.iter_mut().find(|world| world.name == name)
    }
}
