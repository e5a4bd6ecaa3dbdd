mod atomic_io;
mod policy;
mod snapshot;

pub use policy::{
    ConfigError, Policy, DEFAULT_CHUNK_LOAD_RADIUS, DEFAULT_IDLE_THRESHOLD,
    DEFAULT_IDLE_TIMEOUT_TICKS, DEFAULT_SMOOTHING_FACTOR, DEFAULT_TICKET_DURATION,
    ESCAPE_DISTANCE, POLICY_FILE_NAME, WORLD_IDLE_TIMEOUT_TICKS,
};
pub use snapshot::{
    decode_snapshot, encode_snapshot, PersistedLease, SnapshotDocument, SnapshotError,
    SnapshotRead, SnapshotStore, SNAPSHOT_FILE_NAME,
};
