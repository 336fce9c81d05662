//! Key/value store with lazy expiration.
//!
//! Values and their absolute expiration timestamps live in two maps behind
//! one lock so they never disagree. Expired keys are removed as a side
//! effect of the read that observes them; there is no background sweeper.

use crate::error::CommandError;
use crate::storage::unix_ms;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, String>,
    expires: HashMap<String, i64>,
}

/// Concurrent string key/value map with per-key expiration.
#[derive(Debug, Default)]
pub struct KvStore {
    inner: RwLock<Inner>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, optionally expiring `ttl_ms` from now.
    pub fn set(&self, key: &str, value: &str, ttl_ms: Option<i64>) {
        let mut inner = self.inner.write();
        inner.data.insert(key.to_string(), value.to_string());
        match ttl_ms {
            Some(ms) if ms > 0 => {
                inner.expires.insert(key.to_string(), unix_ms() + ms);
            }
            _ => {
                inner.expires.remove(key);
            }
        }
    }

    /// Install an entry with an absolute expiration timestamp, as read from
    /// a snapshot file. A zero timestamp means no expiration.
    pub fn restore(&self, key: String, value: String, expires_at_ms: i64) {
        let mut inner = self.inner.write();
        if expires_at_ms > 0 {
            inner.expires.insert(key.clone(), expires_at_ms);
        }
        inner.data.insert(key, value);
    }

    /// Fetch the value under `key`. A key past its expiration reads as
    /// absent and is removed.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.write();
        if let Some(&at) = inner.expires.get(key) {
            if unix_ms() > at {
                inner.data.remove(key);
                inner.expires.remove(key);
                return None;
            }
        }
        inner.data.get(key).cloned()
    }

    /// Returns true if `key` is present, ignoring expiration.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().data.contains_key(key)
    }

    /// All keys matching `pattern`: `*` matches every key, anything else is
    /// a substring containment test.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let inner = self.inner.read();
        if pattern == "*" {
            inner.data.keys().cloned().collect()
        } else {
            inner
                .data
                .keys()
                .filter(|k| k.contains(pattern))
                .cloned()
                .collect()
        }
    }

    /// Interpret the value under `key` as a signed decimal, add one, and
    /// store it back. An absent key is created as `1`.
    pub fn incr(&self, key: &str) -> Result<i64, CommandError> {
        let mut inner = self.inner.write();
        let next = match inner.data.get(key) {
            Some(value) => {
                let n: i64 = value.parse().map_err(|_| CommandError::NotInteger)?;
                n + 1
            }
            None => 1,
        };
        inner.data.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    /// Number of stored keys, expired or not.
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
