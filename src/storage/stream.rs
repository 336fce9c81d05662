//! Append-only stream engine.
//!
//! Each stream is a radix tree keyed by the textual entry id `ms-seq`. A
//! sentinel record under the reserved key `0-0` tracks the top (highest) id
//! appended so far; `0-0` can never be a real entry id. Ordering is always
//! the numeric `(ms, seq)` pair, never the lexicographic order of the
//! textual id. Writers signal a shared wakeup that blocked readers wait on.

use crate::error::CommandError;
use crate::storage::{unix_ms, Radix};
use dashmap::DashMap;
use std::fmt;
use tokio::sync::Notify;

/// Stream entry id: milliseconds timestamp plus sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    /// Milliseconds since the Unix epoch
    pub ms: u64,
    /// Sequence number within the millisecond
    pub seq: u64,
}

impl StreamId {
    /// Create an id from its parts.
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// One appended stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Entry id
    pub id: StreamId,
    /// Field/value pairs in append order
    pub fields: Vec<(String, String)>,
}

/// A slot in the stream's radix tree: either the top sentinel stored under
/// `0-0`, or a real entry.
#[derive(Debug)]
enum Slot {
    Top(StreamId),
    Entry(StreamEntry),
}

#[derive(Debug)]
struct StreamTree {
    tree: Radix<Slot>,
}

impl StreamTree {
    fn new() -> Self {
        let mut tree = Radix::new();
        tree.insert("0-0", Slot::Top(StreamId::default()));
        Self { tree }
    }

    fn top(&self) -> StreamId {
        match self.tree.find("0-0") {
            Some(Slot::Top(id)) => *id,
            _ => StreamId::default(),
        }
    }

    fn entries(&self) -> Vec<&StreamEntry> {
        self.tree
            .entries()
            .into_iter()
            .filter_map(|(_, slot)| match slot {
                Slot::Entry(e) => Some(e),
                Slot::Top(_) => None,
            })
            .collect()
    }
}

/// An inclusive range endpoint for XRANGE.
#[derive(Debug, Clone, Copy)]
enum Bound {
    Min,
    Max,
    At(StreamId),
}

/// Parse `ms[-seq]`; a missing sequence defaults to zero.
fn parse_id(s: &str) -> Result<StreamId, CommandError> {
    let (ms_part, seq_part) = match s.split_once('-') {
        Some((ms, seq)) => (ms, Some(seq)),
        None => (s, None),
    };
    let ms: u64 = ms_part.parse().map_err(|_| CommandError::StreamInvalidId)?;
    let seq: u64 = match seq_part {
        Some(p) => p.parse().map_err(|_| CommandError::StreamInvalidId)?,
        None => 0,
    };
    Ok(StreamId::new(ms, seq))
}

fn parse_bound(s: &str) -> Result<Bound, CommandError> {
    match s {
        "-" => Ok(Bound::Min),
        "+" => Ok(Bound::Max),
        _ => parse_id(s).map(Bound::At),
    }
}

/// Resolve an explicit id spec against the stream top.
///
/// `*` takes the current wall-clock milliseconds; `ms-*` auto-allocates the
/// sequence. Explicit ids must be strictly greater than the recorded top.
fn allocate(top: StreamId, spec: &str, now_ms: u64) -> Result<StreamId, CommandError> {
    let next_seq = |ms: u64| if ms == top.ms { top.seq + 1 } else { 0 };

    if spec == "*" {
        return Ok(StreamId::new(now_ms, next_seq(now_ms)));
    }
    if spec == "0-0" {
        return Err(CommandError::StreamIdZero);
    }

    let (ms_part, seq_part) = spec.split_once('-').ok_or(CommandError::StreamInvalidId)?;
    let ms: u64 = ms_part.parse().map_err(|_| CommandError::StreamInvalidId)?;
    if ms < top.ms {
        return Err(CommandError::StreamIdTooSmall);
    }

    let seq: u64 = if seq_part == "*" {
        next_seq(ms)
    } else {
        seq_part.parse().map_err(|_| CommandError::StreamInvalidId)?
    };

    if ms == top.ms && seq <= top.seq {
        return Err(CommandError::StreamIdTooSmall);
    }
    Ok(StreamId::new(ms, seq))
}

/// Map of stream key to stream, plus the wakeup shared by blocked readers.
#[derive(Debug, Default)]
pub struct StreamStore {
    streams: DashMap<String, StreamTree>,
    wakeup: Notify,
}

impl StreamStore {
    /// Create an empty stream store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a stream exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.streams.contains_key(key)
    }

    /// Append an entry, allocating the stream on first use. On success all
    /// blocked readers are awakened.
    pub fn append(
        &self,
        key: &str,
        id_spec: &str,
        fields: Vec<(String, String)>,
    ) -> Result<StreamId, CommandError> {
        let id = {
            let mut stream = self
                .streams
                .entry(key.to_string())
                .or_insert_with(StreamTree::new);
            let id = allocate(stream.top(), id_spec, unix_ms() as u64)?;
            stream.tree.insert(&id.to_string(), Slot::Entry(StreamEntry {
                id,
                fields,
            }));
            stream.tree.insert("0-0", Slot::Top(id));
            id
        };

        self.wakeup.notify_waiters();
        Ok(id)
    }

    /// Entries whose id lies within the closed range `[start, end]`.
    ///
    /// `-` resolves to the stream's first entry id and `+` to its top.
    pub fn range(
        &self,
        key: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<StreamEntry>, CommandError> {
        let stream = self.streams.get(key).ok_or(CommandError::StreamNotFound)?;

        let start = match parse_bound(start)? {
            Bound::Min => stream
                .entries()
                .first()
                .map(|e| e.id)
                .unwrap_or_default(),
            Bound::Max => stream.top(),
            Bound::At(id) => id,
        };
        let end = match parse_bound(end)? {
            Bound::Min => StreamId::default(),
            Bound::Max => stream.top(),
            Bound::At(id) => id,
        };

        Ok(stream
            .entries()
            .into_iter()
            .filter(|e| e.id >= start && e.id <= end)
            .cloned()
            .collect())
    }

    /// Entries for a blocking-read request starting at `start`.
    ///
    /// `$` resolves to the top id (the latest entry is included). Any other
    /// spec resolves to its strict successor; `Ok(None)` means no successor
    /// exists yet.
    pub fn read_from(
        &self,
        key: &str,
        start: &str,
    ) -> Result<Option<Vec<StreamEntry>>, CommandError> {
        let stream = self.streams.get(key).ok_or(CommandError::StreamNotFound)?;
        let top = stream.top();

        let from = if start == "$" {
            top
        } else {
            let after = parse_id(start)?;
            match stream.entries().iter().find(|e| e.id > after) {
                Some(entry) => entry.id,
                None => return Ok(None),
            }
        };

        Ok(Some(
            stream
                .entries()
                .into_iter()
                .filter(|e| e.id >= from && e.id <= top)
                .cloned()
                .collect(),
        ))
    }

    /// The top id of the stream under `key`, if it exists.
    pub fn last_id(&self, key: &str) -> Option<StreamId> {
        self.streams.get(key).map(|s| s.top())
    }

    /// Wait until some writer appends to any stream.
    pub async fn wait_for_append(&self) {
        self.wakeup.notified().await;
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Successful appends always produce a strictly increasing id
        /// sequence, whatever mix of explicit and auto specs is used.
        #[test]
        fn ids_are_strictly_monotonic(
            steps in proptest::collection::vec((1u64..50, proptest::bool::ANY), 1..40),
        ) {
            let store = StreamStore::new();
            let mut issued = Vec::new();
            for (ms, auto) in steps {
                let spec = if auto {
                    format!("{ms}-*")
                } else {
                    format!("{ms}-1")
                };
                if let Ok(id) = store.append("s", &spec, Vec::new()) {
                    issued.push(id);
                }
            }
            for pair in issued.windows(2) {
                prop_assert!(pair[1] > pair[0]);
            }
        }

        /// Range returns exactly the entries whose id lies in the closed
        /// range.
        #[test]
        fn range_coverage(
            lo in 1u64..30, hi in 1u64..30,
        ) {
            let (lo, hi) = (lo.min(hi), lo.max(hi));
            let store = StreamStore::new();
            for ms in 1..=30u64 {
                store.append("s", &format!("{ms}-0"), Vec::new()).unwrap();
            }

            let hits = store
                .range("s", &format!("{lo}-0"), &format!("{hi}-0"))
                .unwrap();
            let ids: Vec<u64> = hits.iter().map(|e| e.id.ms).collect();
            let expected: Vec<u64> = (lo..=hi).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
