use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{Storage, StorageEntry, StorageError, immediate_children};

/// In-memory storage for tests and the CLI's dry runs.
///
/// Entries live in a `BTreeMap` behind `Arc<Mutex<>>` so clones share state.
/// Each operation can be switched to fail on demand, which is how rollback
/// paths in the policy engine are exercised.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Faults {
    get: AtomicBool,
    put: AtomicBool,
    delete: AtomicBool,
    list: AtomicBool,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail (or stop failing).
    pub fn fail_get(&self, fail: bool) {
        self.faults.get.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `put` fail (or stop failing).
    pub fn fail_put(&self, fail: bool) {
        self.faults.put.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail (or stop failing).
    pub fn fail_delete(&self, fail: bool) {
        self.faults.delete.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `list` fail (or stop failing).
    pub fn fail_list(&self, fail: bool) {
        self.faults.list.store(fail, Ordering::SeqCst);
    }

    /// Number of stored entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.inner.lock().expect("Mutex poisoned").len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored key in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn keys(&self) -> Vec<String> {
        #[allow(clippy::expect_used)]
        self.inner.lock().expect("Mutex poisoned").keys().cloned().collect()
    }

    fn injected(switch: &AtomicBool, op: &str) -> Result<(), StorageError> {
        if switch.load(Ordering::SeqCst) {
            return Err(StorageError::Io(format!("{op} failed")));
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        Self::injected(&self.faults.get, "get")?;

        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.get(key).map(|value| StorageEntry::new(key, value.clone())))
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        Self::injected(&self.faults.put, "put")?;

        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.insert(entry.key.clone(), entry.value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        Self::injected(&self.faults.delete, "delete")?;

        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Self::injected(&self.faults.list, "list")?;

        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(immediate_children(
            prefix,
            inner
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .map(|(k, _)| k.as_str())
                .take_while(|k| k.starts_with(prefix)),
        ))
    }
}
