use std::sync::Arc;

use cartkeep::{
    resolve_state_paths, ConfigError, KeepAliveService, PerEntityTicketNamer, Policy,
    SharedTicketNamer, SnapshotError, SnapshotStore, StartupError, StatePaths, TicketNamer,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::sim::{demo_server, SimCartHandle, SimServer};

const SIM_TICKS_ENV_VAR: &str = "CARTKEEP_SIM_TICKS";
const SAVE_INTERVAL_ENV_VAR: &str = "CARTKEEP_SAVE_INTERVAL";
const DEFAULT_SIM_TICKS: u64 = 12_000;
/// Matches the host's five minute autosave.
const DEFAULT_SAVE_INTERVAL_TICKS: u64 = 6_000;
const TICKET_NAMING_ENV_VAR: &str = "CARTKEEP_TICKET_NAMING";
const TICKET_NAME: &str = "am_minecart";

/// How keep-alive tickets are keyed on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum TicketNaming {
    /// Every lease shares one ticket name.
    #[default]
    Shared,
    /// `am_minecart_<entity id>`, so the host can tell leases apart.
    PerEntity,
}

impl TicketNaming {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "shared" => Some(Self::Shared),
            "per_entity" | "per-entity" => Some(Self::PerEntity),
            _ => None,
        }
    }

    pub(crate) fn namer(self, lifetime_ticks: u32) -> Arc<dyn TicketNamer> {
        match self {
            Self::Shared => Arc::new(SharedTicketNamer::new(TICKET_NAME, lifetime_ticks)),
            Self::PerEntity => Arc::new(PerEntityTicketNamer::new(TICKET_NAME, lifetime_ticks)),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to load policy: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to access lease snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RunConfig {
    pub(crate) total_ticks: u64,
    pub(crate) save_interval_ticks: u64,
    pub(crate) ticket_naming: TicketNaming,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_ticks: DEFAULT_SIM_TICKS,
            save_interval_ticks: DEFAULT_SAVE_INTERVAL_TICKS,
            ticket_naming: TicketNaming::default(),
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) run: RunConfig,
    pub(crate) paths: StatePaths,
    pub(crate) store: SnapshotStore,
    pub(crate) service: KeepAliveService<SimCartHandle>,
    pub(crate) server: SimServer,
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn build_app() -> Result<AppWiring, HostError> {
    info!("=== cartkeep host startup ===");
    let paths = resolve_state_paths()?;
    info!(
        state_dir = %paths.state_dir.display(),
        policy_file = %paths.policy_file.display(),
        snapshot_file = %paths.snapshot_file.display(),
        "startup"
    );
    wire(paths, run_config_from_env())
}

pub(crate) fn wire(paths: StatePaths, run: RunConfig) -> Result<AppWiring, HostError> {
    let policy = Policy::load_or_init(&paths.policy_file)?;
    let store = SnapshotStore::new(paths.snapshot_file.clone());
    let startup_entries = store.load()?.into_entries();

    let ticket_namer = run.ticket_naming.namer(policy.ticket_duration);
    let service = KeepAliveService::new(policy, ticket_namer).with_startup_snapshot(startup_entries);

    Ok(AppWiring {
        run,
        paths,
        store,
        service,
        server: demo_server(),
    })
}

fn run_config_from_env() -> RunConfig {
    let defaults = RunConfig::default();
    RunConfig {
        total_ticks: parse_u64_from_env(SIM_TICKS_ENV_VAR, defaults.total_ticks),
        save_interval_ticks: parse_u64_from_env(
            SAVE_INTERVAL_ENV_VAR,
            defaults.save_interval_ticks,
        ),
        ticket_naming: ticket_naming_from_env(defaults.ticket_naming),
    }
}

fn ticket_naming_from_env(default: TicketNaming) -> TicketNaming {
    let Ok(raw) = std::env::var(TICKET_NAMING_ENV_VAR) else {
        return default;
    };
    TicketNaming::parse(&raw).unwrap_or_else(|| {
        warn!(
            var = TICKET_NAMING_ENV_VAR,
            value = %raw,
            "invalid_env_value_using_default"
        );
        default
    })
}

fn parse_u64_from_env(var: &'static str, default: u64) -> u64 {
    let Ok(raw) = std::env::var(var) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) => value,
        Err(_) => {
            warn!(var, value = %raw, default, "invalid_env_value_using_default");
            default
        }
    }
}
