//! # LRU Cache
//!
//! Least Recently Used cache handed to collaborators by the host session.
//! It is an ordinary value with an owner and a lifetime: there is no global
//! instance. The geocoding fan-out uses it to avoid asking the geocoder
//! twice for the same spot.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// LRU cache with O(log n) eviction.
///
/// Recency is a monotonically increasing tick; `order` maps ticks back to
/// keys so the oldest entry is always the first one in the tree.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a value and mark it as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some((value, last)) => {
                self.order.remove(last);
                self.order.insert(tick, key.clone());
                *last = tick;
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up a value without touching recency or statistics.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Insert or replace a value, evicting the least recently used entry
    /// when full. Returns the evicted key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        let tick = self.next_tick();

        if let Some((old_value, last)) = self.entries.get_mut(&key) {
            *old_value = value;
            self.order.remove(last);
            *last = tick;
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
        evicted
    }

    /// Remove a key from the cache.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let (value, last) = self.entries.remove(key)?;
        self.order.remove(&last);
        Some(value)
    }

    /// Drop all entries and reset statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.tick = 0;
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// (hits, misses) since creation or the last `clear`.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn evict_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}
