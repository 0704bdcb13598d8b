//! Map with a fixed time-to-live per entry.
//!
//! Eviction is lazy: every read first drops all entries older than the TTL,
//! so an expired entry is never observed, whether or not a write happened since.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct ExpiringEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, ExpiringEntry<V>>,
}

impl<K: Eq + Hash, V> ExpiringCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn put(&mut self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    pub fn put_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(key, ExpiringEntry { value, inserted_at: now });
    }

    pub fn contains(&mut self, key: &K) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn contains_at(&mut self, key: &K, now: Instant) -> bool {
        self.purge(now);
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<&V> {
        self.purge(now);
        self.entries.get(key).map(|e| &e.value)
    }

    /// Number of entries still stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry with `now > inserted_at + ttl`. Entries exactly at the boundary stay.
    pub fn purge(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) <= ttl);
    }
}
