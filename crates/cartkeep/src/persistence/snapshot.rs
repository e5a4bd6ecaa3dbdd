use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::atomic_io::write_json_atomic;

pub const SNAPSHOT_FILE_NAME: &str = "autonomous-minecarts-tickets.json";

/// Durable form of one live lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistedLease {
    #[serde(rename = "minecartId")]
    pub entity_id: String,
    #[serde(rename = "x")]
    pub region_x: i32,
    #[serde(rename = "z")]
    pub region_z: i32,
    #[serde(rename = "idleTicks")]
    pub idle_ticks: u32,
    #[serde(rename = "worldName")]
    pub world_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub tickets: Vec<PersistedLease>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotRead {
    /// No snapshot on disk; a fresh install.
    Missing,
    /// The file exists but no record could be parsed from it.
    Unreadable(String),
    Present(Vec<PersistedLease>),
}

impl SnapshotRead {
    /// Entries to replay; missing and unreadable snapshots both mean none.
    pub fn into_entries(self) -> Vec<PersistedLease> {
        match self {
            SnapshotRead::Present(entries) => entries,
            SnapshotRead::Missing | SnapshotRead::Unreadable(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode snapshot json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn encode_snapshot(entries: &[PersistedLease]) -> Result<String, SnapshotError> {
    let document = SnapshotDocument {
        tickets: entries.to_vec(),
    };
    serde_json::to_string_pretty(&document).map_err(SnapshotError::Encode)
}

#[derive(Deserialize)]
struct RawSnapshotDocument {
    tickets: Vec<serde_json::Value>,
}

/// Tickets that fail to decode are skipped one by one. Fails only when the
/// document itself is malformed or no ticket in it decodes.
pub fn decode_snapshot(raw: &str) -> Result<Vec<PersistedLease>, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let document =
        match serde_path_to_error::deserialize::<_, RawSnapshotDocument>(&mut deserializer) {
            Ok(document) => document,
            Err(error) => {
                let path = error.path().to_string();
                return Err(parse_failure(&path, error.into_inner()));
            }
        };

    let mut entries = Vec::with_capacity(document.tickets.len());
    let mut first_failure = None;
    for (index, value) in document.tickets.into_iter().enumerate() {
        match serde_path_to_error::deserialize::<_, PersistedLease>(value) {
            Ok(entry) => entries.push(entry),
            Err(error) => {
                let field = error.path().to_string();
                let path = if field.is_empty() || field == "." {
                    format!("tickets[{index}]")
                } else {
                    format!("tickets[{index}].{field}")
                };
                let reason = parse_failure(&path, error.into_inner());
                warn!(index, reason = %reason, "snapshot_entry_skipped_unparseable");
                first_failure.get_or_insert(reason);
            }
        }
    }

    match first_failure {
        Some(reason) if entries.is_empty() => Err(reason),
        _ => Ok(entries),
    }
}

fn parse_failure(path: &str, source: serde_json::Error) -> String {
    if path.is_empty() || path == "." {
        format!("parse snapshot json: {source}")
    } else {
        format!("parse snapshot json at {path}: {source}")
    }
}

/// File-backed home of the lease snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SNAPSHOT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, entries: &[PersistedLease]) -> Result<(), SnapshotError> {
        let text = encode_snapshot(entries)?;
        write_json_atomic(&self.path, &text).map_err(|source| SnapshotError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(
            path = %self.path.display(),
            lease_count = entries.len(),
            "snapshot_saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<SnapshotRead, SnapshotError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "snapshot_missing_fresh_start");
                return Ok(SnapshotRead::Missing);
            }
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match decode_snapshot(&raw) {
            Ok(entries) => {
                info!(
                    path = %self.path.display(),
                    lease_count = entries.len(),
                    "snapshot_loaded"
                );
                Ok(SnapshotRead::Present(entries))
            }
            Err(reason) => {
                warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "snapshot_unreadable_ignored"
                );
                Ok(SnapshotRead::Unreadable(reason))
            }
        }
    }
}
