//! Snapshot persistence.
//!
//! Only loading is implemented: a binary point-in-time snapshot can be read
//! into the key/value store at startup, or decoded from the blob a primary
//! sends during the replication handshake. This system never writes one.

mod snapshot;

pub use snapshot::{load_bytes, load_file, LoadStats, EMPTY_SNAPSHOT};
