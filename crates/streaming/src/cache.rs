use std::collections::BTreeMap;
use std::rc::Rc;

use runtime::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    written_at_ms: u64,
    last_used_tick: u64,
}

/// LRU cache with an absolute TTL for derived datasets.
///
/// Recency and age are tracked separately:
/// - `get` and `set` both move a key to the most-recently-used position.
/// - Age counts from the last `set` only; a read never extends the lifetime.
/// - An expired entry found by `get` is removed on the spot.
///
/// Entries sit in a `BTreeMap` and eviction picks the lowest `last_used_tick`,
/// so the victim is deterministic.
pub struct DatasetCache<K, V> {
    capacity: usize,
    ttl_ms: u64,
    tick: u64,
    clock: Rc<dyn Clock>,
    entries: BTreeMap<K, CacheEntry<V>>,
}

impl<K: Ord + Clone + std::fmt::Debug, V> DatasetCache<K, V> {
    pub fn new(capacity: usize, ttl_ms: u64, clock: Rc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl_ms,
            tick: 0,
            clock,
            entries: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presence check that neither touches recency nor purges.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = self.clock.now_ms();
        let expired = {
            let entry = self.entries.get(key)?;
            now.saturating_sub(entry.written_at_ms) > self.ttl_ms
        };
        if expired {
            tracing::debug!(?key, "dataset cache entry expired");
            self.entries.remove(key);
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.last_used_tick = tick;
        Some(&entry.value)
    }

    /// Inserts or refreshes `key`, returning the key evicted to make room.
    pub fn set(&mut self, key: K, value: V) -> Option<K> {
        self.tick += 1;
        let entry = CacheEntry {
            value,
            written_at_ms: self.clock.now_ms(),
            last_used_tick: self.tick,
        };
        self.entries.insert(key, entry);

        if self.entries.len() <= self.capacity {
            return None;
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used_tick)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&victim);
        tracing::debug!(key = ?victim, "dataset cache evicted");
        Some(victim)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
