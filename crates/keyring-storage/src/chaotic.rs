//! Fault injection for storage-consistency tests.
//!
//! Policy persistence must leave storage and memory agreeing after any
//! failed call. Wrapping a backend in [`ChaoticStorage`] turns a fraction of
//! its calls into I/O errors, chosen by a seeded generator so that a failing
//! run replays exactly.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use crate::{Storage, StorageEntry, StorageError};

const DEFAULT_SEED: u64 = 0x6b65_7972_696e_6721;

/// Storage wrapper that fails each call with probability `failure_rate`.
///
/// Clones share the generator and the counters.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    failure_rate: f64,
    dice: Arc<Dice>,
    calls: Arc<AtomicUsize>,
    injected: Arc<AtomicUsize>,
}

/// SplitMix64 over an atomic counter; no lock needed between threads.
struct Dice {
    state: AtomicU64,
}

impl Dice {
    const GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

    /// Uniform in [0.0, 1.0).
    fn roll(&self) -> f64 {
        let mut z = self.state.fetch_add(Self::GAMMA, Ordering::Relaxed).wrapping_add(Self::GAMMA);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// If `failure_rate` is outside `0.0..=1.0`.
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, DEFAULT_SEED)
    }

    /// Wrap `inner`, drawing failures from `seed`.
    ///
    /// # Panics
    ///
    /// If `failure_rate` is outside `0.0..=1.0`.
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!((0.0..=1.0).contains(&failure_rate), "failure rate {failure_rate} outside 0.0..=1.0");

        Self {
            inner,
            failure_rate,
            dice: Arc::new(Dice { state: AtomicU64::new(seed) }),
            calls: Arc::new(AtomicUsize::new(0)),
            injected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The wrapped backend, for checking what actually landed.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls attempted through this wrapper.
    pub fn operation_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Calls failed on purpose.
    pub fn failure_count(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }

    fn maybe_fail(&self, op: &'static str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.dice.roll() >= self.failure_rate {
            return Ok(());
        }

        self.injected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(op, "injecting storage failure");
        Err(StorageError::Io(format!("injected {op} failure")))
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        self.maybe_fail("get")?;
        self.inner.get(key)
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        self.maybe_fail("put")?;
        self.inner.put(entry)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.maybe_fail("delete")?;
        self.inner.delete(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.maybe_fail("list")?;
        self.inner.list(prefix)
    }
}
