use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::atomic_io::write_json_atomic;

pub const POLICY_FILE_NAME: &str = "autonomous-minecarts.json";

pub const DEFAULT_IDLE_TIMEOUT_TICKS: u32 = 6000;
pub const DEFAULT_IDLE_THRESHOLD: f64 = 0.2;
pub const DEFAULT_CHUNK_LOAD_RADIUS: u32 = 2;
pub const DEFAULT_TICKET_DURATION: u32 = 60;
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.01;
pub const ESCAPE_DISTANCE: f64 = 20.0;
/// 300 ticks = 15 seconds.
pub const WORLD_IDLE_TIMEOUT_TICKS: u32 = 300;

/// Tunable thresholds shared read-only by every tracker, lease and world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    /// Idle ticks after which a lease is dropped. 6000 ticks is 5 minutes.
    pub idle_timeout_ticks: u32,
    /// Minimum per-tick displacement for an entity to count as moving.
    pub idle_threshold: f64,
    /// Radius around a leased region that the host keeps processed.
    pub chunk_load_radius: u32,
    /// Ticks between forced lease re-issues. 0 re-issues every tick.
    pub ticket_duration: u32,
    /// Weight of the newest sample in the position moving average.
    pub smoothing_factor: f64,
    #[serde(skip)]
    pub escape_distance: f64,
    #[serde(skip)]
    pub world_idle_timeout: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            idle_timeout_ticks: DEFAULT_IDLE_TIMEOUT_TICKS,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            chunk_load_radius: DEFAULT_CHUNK_LOAD_RADIUS,
            ticket_duration: DEFAULT_TICKET_DURATION,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            escape_distance: ESCAPE_DISTANCE,
            world_idle_timeout: WORLD_IDLE_TIMEOUT_TICKS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse policy file {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid policy value {field} in {path}: {message}")]
    Invalid {
        path: PathBuf,
        field: &'static str,
        message: String,
    },
    #[error("failed to encode policy json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write policy file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Policy {
    /// Reads the policy at `path`, writing the defaults there first when the
    /// file does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Policy, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                let policy = Policy::default();
                policy.save(path)?;
                info!(path = %path.display(), "policy_defaults_written");
                return Ok(policy);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let policy = Self::parse_json(&raw, path)?;
        policy.validate(path)?;
        info!(
            path = %path.display(),
            idle_timeout_ticks = policy.idle_timeout_ticks,
            idle_threshold = policy.idle_threshold,
            chunk_load_radius = policy.chunk_load_radius,
            ticket_duration = policy.ticket_duration,
            smoothing_factor = policy.smoothing_factor,
            "policy_loaded"
        );
        Ok(policy)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(ConfigError::Encode)?;
        write_json_atomic(path, &text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse_json(raw: &str, path: &Path) -> Result<Policy, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, Policy>(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            ConfigError::Parse {
                path: path.to_path_buf(),
                field,
                source: error.into_inner(),
            }
        })
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            field,
            message,
        };

        if self.idle_timeout_ticks == 0 {
            return Err(invalid(
                "idleTimeoutTicks",
                "expected at least 1 tick".to_string(),
            ));
        }
        if !self.idle_threshold.is_finite() || self.idle_threshold < 0.0 {
            return Err(invalid(
                "idleThreshold",
                format!("expected finite non-negative number, got {}", self.idle_threshold),
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_factor) {
            return Err(invalid(
                "smoothingFactor",
                format!("expected number in [0, 1], got {}", self.smoothing_factor),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_writes_defaults_and_returns_them() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join(POLICY_FILE_NAME);

        let policy = Policy::load_or_init(&path).expect("load");
        assert_eq!(policy, Policy::default());

        let written = fs::read_to_string(&path).expect("defaults persisted");
        let value: serde_json::Value = serde_json::from_str(&written).expect("json");
        assert_eq!(value["idleTimeoutTicks"], 6000);
        assert_eq!(value["chunkLoadRadius"], 2);
        assert_eq!(value["ticketDuration"], 60);
        assert_eq!(value["idleThreshold"], 0.2);
        assert_eq!(value["smoothingFactor"], 0.01);
        assert!(value.get("escapeDistance").is_none());
        assert!(value.get("worldIdleTimeout").is_none());

        let reloaded = Policy::load_or_init(&path).expect("reload");
        assert_eq!(reloaded, policy);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(POLICY_FILE_NAME);
        fs::write(&path, r#"{ "idleTimeoutTicks": 1200, "ticketDuration": 20 }"#)
            .expect("write");

        let policy = Policy::load_or_init(&path).expect("load");
        assert_eq!(policy.idle_timeout_ticks, 1200);
        assert_eq!(policy.ticket_duration, 20);
        assert_eq!(policy.chunk_load_radius, DEFAULT_CHUNK_LOAD_RADIUS);
        assert_eq!(policy.escape_distance, ESCAPE_DISTANCE);
        assert_eq!(policy.world_idle_timeout, WORLD_IDLE_TIMEOUT_TICKS);
    }

    #[test]
    fn type_error_reports_field_path() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(POLICY_FILE_NAME);
        fs::write(&path, r#"{ "chunkLoadRadius": "wide" }"#).expect("write");

        let error = Policy::load_or_init(&path).expect_err("error");
        let ConfigError::Parse { field, .. } = error else {
            panic!("expected parse error, got {error:?}");
        };
        assert_eq!(field, "chunkLoadRadius");
    }

    #[test]
    fn out_of_range_smoothing_factor_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(POLICY_FILE_NAME);
        fs::write(&path, r#"{ "smoothingFactor": 1.5 }"#).expect("write");

        let error = Policy::load_or_init(&path).expect_err("error");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "smoothingFactor",
                ..
            }
        ));
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(POLICY_FILE_NAME);
        fs::write(&path, r#"{ "idleTimeoutTicks": 0 }"#).expect("write");

        let error = Policy::load_or_init(&path).expect_err("error");
        assert!(error.to_string().contains("idleTimeoutTicks"));
    }
}
