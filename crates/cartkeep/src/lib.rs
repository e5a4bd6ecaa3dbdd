use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod persistence;
mod service;
pub mod tracking;

pub use persistence::{
    decode_snapshot, encode_snapshot, ConfigError, PersistedLease, Policy, SnapshotDocument,
    SnapshotError, SnapshotRead, SnapshotStore, POLICY_FILE_NAME, SNAPSHOT_FILE_NAME,
};
pub use service::{KeepAliveService, RestoreSummary};
pub use tracking::{
    ActivityTracker, EntityHandle, EntityId, HostServer, HostWorld, LeaseHandler, LeaseStatus,
    PerEntityTicketNamer, RegionCoord, SharedTicketNamer, TickReport, TicketKey, TicketNamer,
    Vec3, WorldIdleGate, WorldOrchestrator,
};

pub const STATE_DIR_ENV_VAR: &str = "CARTKEEP_STATE_DIR";
const DEFAULT_STATE_DIR_NAME: &str = "config";

/// Where the policy and the lease snapshot live.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub policy_file: PathBuf,
    pub snapshot_file: PathBuf,
}

impl StatePaths {
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            policy_file: state_dir.join(POLICY_FILE_NAME),
            snapshot_file: state_dir.join(SNAPSHOT_FILE_NAME),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("failed to create state directory at {path}: {source}")]
    CreateStateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Uses `CARTKEEP_STATE_DIR` when set, `./config` otherwise, and makes sure
/// the directory exists.
pub fn resolve_state_paths() -> Result<StatePaths, StartupError> {
    let state_dir = match env::var(STATE_DIR_ENV_VAR) {
        Ok(value) => PathBuf::from(value),
        Err(env::VarError::NotPresent) => env::current_dir()
            .map_err(StartupError::CurrentDir)?
            .join(DEFAULT_STATE_DIR_NAME),
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: STATE_DIR_ENV_VAR,
                source,
            })
        }
    };

    fs::create_dir_all(&state_dir).map_err(|source| StartupError::CreateStateDir {
        path: state_dir.clone(),
        source,
    })?;

    Ok(StatePaths::in_dir(&normalize_path(&state_dir)))
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
