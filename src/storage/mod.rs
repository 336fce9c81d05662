//! In-memory storage: the KV map with expiration, the stream engine, and
//! the ordered-map / queue containers they are built on.

mod kv;
mod queue;
mod radix;
mod stream;

pub use kv::KvStore;
pub use queue::Fifo;
pub use radix::Radix;
pub use stream::{StreamEntry, StreamId, StreamStore};

/// Current wall-clock time as milliseconds since the Unix epoch.
pub(crate) fn unix_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
