//! Two-queue LRU cache for decrypted path segments.
//!
//! Entries seen once live in `recent`; a second hit promotes them to
//! `frequent`. Keys evicted from `recent` are remembered in `ghost` without
//! their value, so a key that comes back soon after eviction goes straight
//! to `frequent`. A burst of one-off listings therefore cannot flush the
//! segments that are looked up over and over.
//!
//! ```text
//!   add ──► recent ──hit──► frequent ◄──┐
//!             │                         │
//!           evict ──► ghost ──re-add────┘
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::Arc,
};

use parking_lot::Mutex;

/// Default number of cached entries.
pub const DEFAULT_CACHE_SIZE: usize = 16 * 1024;

/// Share of the capacity reserved for entries seen once.
const RECENT_RATIO: f64 = 0.25;

/// Ghost capacity relative to the total capacity.
const GHOST_RATIO: f64 = 0.50;

/// Recency-ordered map. Lookups that touch an entry move it to the back.
struct Lru<K, V> {
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Hash + Eq + Clone, V> Lru<K, V> {
    fn new() -> Self {
        Self { entries: HashMap::new(), order: BTreeMap::new(), tick: 0 }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let (_, stamp) = self.entries.get_mut(key)?;
        let old = std::mem::replace(stamp, tick);
        if let Some(k) = self.order.remove(&old) {
            self.order.insert(tick, k);
        }
        self.entries.get(key).map(|(value, _)| value)
    }

    fn insert(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        if let Some((_, old)) = self.entries.insert(key.clone(), (value, tick)) {
            self.order.remove(&old);
        }
        self.order.insert(tick, key);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let (value, stamp) = self.entries.remove(key)?;
        self.order.remove(&stamp);
        Some(value)
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let (value, _) = self.entries.remove(&key)?;
        Some((key, value))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

struct Queues<K, V> {
    recent: Lru<K, V>,
    frequent: Lru<K, V>,
    ghost: Lru<K, ()>,
    size: usize,
    recent_size: usize,
    ghost_size: usize,
}

impl<K: Hash + Eq + Clone, V> Queues<K, V> {
    fn len(&self) -> usize {
        self.recent.len() + self.frequent.len()
    }

    /// Make room for one entry. `ghost_hit` means the incoming key was
    /// recently evicted from `recent` and is headed for `frequent`.
    fn ensure_space(&mut self, ghost_hit: bool) {
        if self.len() < self.size {
            return;
        }

        let recent_len = self.recent.len();
        if recent_len > 0
            && (recent_len > self.recent_size || (recent_len == self.recent_size && !ghost_hit))
        {
            if let Some((key, _)) = self.recent.pop_oldest() {
                if self.ghost.len() >= self.ghost_size {
                    self.ghost.pop_oldest();
                }
                self.ghost.insert(key, ());
            }
            return;
        }

        self.frequent.pop_oldest();
    }
}

/// Thread-safe two-queue cache. Clones share the same entries.
pub struct TwoQueueCache<K, V> {
    inner: Arc<Mutex<Queues<K, V>>>,
}

impl<K, V> Clone for TwoQueueCache<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> TwoQueueCache<K, V> {
    /// Cache holding at most `size` entries.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "cache size must be positive");

        Self {
            inner: Arc::new(Mutex::new(Queues {
                recent: Lru::new(),
                frequent: Lru::new(),
                ghost: Lru::new(),
                size,
                recent_size: ((size as f64) * RECENT_RATIO) as usize,
                ghost_size: ((size as f64) * GHOST_RATIO) as usize,
            })),
        }
    }

    /// Look up `key`, promoting it to the frequent queue on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut q = self.inner.lock();

        if let Some(value) = q.frequent.get(key) {
            return Some(value.clone());
        }
        let value = q.recent.remove(key)?;
        q.frequent.insert(key.clone(), value.clone());
        Some(value)
    }

    /// Insert or replace `key`.
    pub fn insert(&self, key: K, value: V) {
        let mut q = self.inner.lock();

        if q.frequent.contains(&key) {
            q.frequent.insert(key, value);
            return;
        }
        if q.recent.remove(&key).is_some() {
            q.frequent.insert(key, value);
            return;
        }
        if q.ghost.contains(&key) {
            q.ensure_space(true);
            q.ghost.remove(&key);
            q.frequent.insert(key, value);
            return;
        }

        q.ensure_space(false);
        q.recent.insert(key, value);
    }

    /// Drop `key` from every queue.
    pub fn remove(&self, key: &K) {
        let mut q = self.inner.lock();
        q.recent.remove(key);
        q.frequent.remove(key);
        q.ghost.remove(key);
    }

    /// Number of entries holding a value.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no entry holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut q = self.inner.lock();
        q.recent.clear();
        q.frequent.clear();
        q.ghost.clear();
    }
}
