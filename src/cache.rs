// src/cache.rs

use std::collections::BTreeMap;
use std::hash::Hash;

use ahash::AHashMap;
use parking_lot::Mutex;

pub const DEFAULT_CACHE_SIZE: usize = 1024;

struct Inner<K, V> {
    entries: AHashMap<K, (V, u64)>,
    /// Last-use tick to key, oldest first.
    recency: BTreeMap<u64, K>,
    clock: u64,
    hits: u64,
    misses: u64,
}

/// A bounded, thread-safe least-recently-used map.
///
/// Values are handed out by clone, so callers should store cheap handles
/// (`Arc`, `Option<Arc<_>>`). Eviction only drops the cache's own copy and
/// never affects a value already returned.
pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: AHashMap::with_capacity(capacity.max(1)),
                recency: BTreeMap::new(),
                clock: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let now = inner.clock;
        match inner.entries.get_mut(key) {
            Some((value, used)) => {
                if let Some(k) = inner.recency.remove(&*used) {
                    inner.recency.insert(now, k);
                }
                *used = now;
                inner.hits += 1;
                Some(value.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert `value`, evicting the least recently used entry when full.
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let now = inner.clock;
        match inner.entries.get(&key).map(|(_, used)| *used) {
            Some(used) => {
                inner.recency.remove(&used);
            }
            None if inner.entries.len() >= self.capacity => {
                if let Some((_, oldest)) = inner.recency.pop_first() {
                    inner.entries.remove(&oldest);
                }
            }
            None => {}
        }
        inner.recency.insert(now, key.clone());
        inner.entries.insert(key, (value, now));
    }

    /// Cached value for `key`, computing and caching it on a miss.
    ///
    /// The lock is not held while `compute` runs; two threads missing on the
    /// same key both compute, and the later insert wins.
    pub fn get_or_try_insert_with<E, F>(&self, key: &K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key.clone(), value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.hits, inner.misses)
    }
}
