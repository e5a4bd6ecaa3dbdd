use std::process::ExitCode;

use cartkeep::{HostServer, HostWorld, SnapshotError, TickReport};
use tracing::{error, info};

use super::bootstrap::AppWiring;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) saves: u64,
    pub(crate) leases_created: usize,
    pub(crate) leases_timed_out: usize,
    pub(crate) leases_dropped: usize,
    pub(crate) suspended_world_ticks: u64,
}

impl RunSummary {
    fn absorb(&mut self, report: TickReport) {
        self.leases_created += report.leases_created;
        self.leases_timed_out += report.leases_timed_out;
        self.leases_dropped += report.leases_dropped;
        if report.suspended {
            self.suspended_world_ticks += 1;
        }
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_ticks(app) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                saves = summary.saves,
                leases_created = summary.leases_created,
                leases_timed_out = summary.leases_timed_out,
                leases_dropped = summary.leases_dropped,
                suspended_world_ticks = summary.suspended_world_ticks,
                "shutdown"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "save_failed");
            ExitCode::FAILURE
        }
    }
}

/// Drives every world through `run.total_ticks` ticks, saving at each save
/// point and once more on shutdown.
pub(crate) fn run_ticks(mut app: AppWiring) -> Result<RunSummary, SnapshotError> {
    let world_names = app.server.world_names();
    let mut summary = RunSummary::default();

    for tick in 1..=app.run.total_ticks {
        for name in &world_names {
            app.service.before_world_tick(&mut app.server, name);
            if let Some(world) = app.server.world_mut(name) {
                world.step(tick);
            }
            let report = app.service.after_world_tick(&mut app.server, name);
            summary.absorb(report);
        }
        summary.ticks = tick;

        if app.run.save_interval_ticks > 0 && tick % app.run.save_interval_ticks == 0 {
            app.store.save(&app.service.persisted_leases())?;
            summary.saves += 1;
            for world in app.server.worlds() {
                info!(
                    tick,
                    world = %world.name(),
                    directives_issued = world.directives_issued(),
                    live_tickets = world.live_ticket_count(),
                    "save_point"
                );
            }
        }
    }

    app.store.save(&app.service.persisted_leases())?;
    summary.saves += 1;
    info!(
        state_dir = %app.paths.state_dir.display(),
        lease_count = app.service.lease_count(),
        "final_snapshot_saved"
    );
    Ok(summary)
}
