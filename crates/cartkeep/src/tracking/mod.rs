mod activity;
mod host;
mod lease;
mod orchestrator;
#[cfg(test)]
pub(crate) mod test_support;
mod types;

pub use activity::ActivityTracker;
pub use host::{
    EntityHandle, HostServer, HostWorld, PerEntityTicketNamer, SharedTicketNamer, TicketKey,
    TicketNamer,
};
pub use lease::{LeaseHandler, LeaseStatus};
pub use orchestrator::{TickReport, WorldIdleGate, WorldOrchestrator};
pub use types::{EntityId, RegionCoord, Vec3};
