use crate::persistence::Policy;

use super::host::EntityHandle;
use super::types::Vec3;

/// Decides whether an entity is genuinely travelling.
///
/// Two tests, either of which marks the entity idle: the last per-tick
/// displacement is below `idle_threshold`, or the entity is still within
/// `escape_distance` of the exponential moving average of its own position.
/// The second test catches entities that move quickly but never leave a
/// small pocket.
#[derive(Debug, Clone)]
pub struct ActivityTracker<E> {
    entity: E,
    previous_position: Vec3,
    smoothed_position: Vec3,
    is_active: bool,
    touched_this_tick: bool,
}

impl<E: EntityHandle> ActivityTracker<E> {
    /// Starts a tracker on first sighting. The moving average starts at the
    /// current position and the first classification comes from the entity's
    /// velocity, so an entity already moving when first seen is active.
    pub fn new(entity: E, policy: &Policy) -> Self {
        let position = entity.position();
        let is_active = entity.velocity().length() >= policy.idle_threshold;
        Self {
            entity,
            previous_position: position,
            smoothed_position: position,
            is_active,
            touched_this_tick: true,
        }
    }

    pub fn update(&mut self, entity: E, policy: &Policy) {
        let position = entity.position();
        self.entity = entity;
        self.record_sample(position, policy);
        self.touched_this_tick = true;
    }

    fn record_sample(&mut self, position: Vec3, policy: &Policy) {
        let displacement = position - self.previous_position;
        let factor = policy.smoothing_factor;
        self.smoothed_position = position.scale(factor) + self.smoothed_position.scale(1.0 - factor);

        let too_slow = displacement.length() < policy.idle_threshold;
        let not_escaping = self.smoothed_position.distance(position) < policy.escape_distance;
        self.is_active = !(too_slow || not_escaping);

        self.previous_position = position;
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns whether the tracker was updated since the last call, and clears
    /// the flag.
    pub fn take_touched(&mut self) -> bool {
        std::mem::replace(&mut self.touched_this_tick, false)
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    pub fn smoothed_position(&self) -> Vec3 {
        self.smoothed_position
    }
}
