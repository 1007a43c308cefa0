//! Cancellation propagation into storage calls.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{Storage, StorageEntry, StorageError};

/// Shared cancellation flag.
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a live token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every holder of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(StorageError::Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() { Err(StorageError::Cancelled) } else { Ok(()) }
    }
}

/// Storage wrapper that refuses calls after its token is cancelled.
///
/// The token is checked before every call; a call already inside the
/// backend runs to completion.
#[derive(Debug, Clone)]
pub struct CancellableStorage<S: Storage> {
    inner: S,
    token: CancelToken,
}

impl<S: Storage> CancellableStorage<S> {
    /// Wrap `inner` so that every call first checks `token`.
    pub fn new(inner: S, token: CancelToken) -> Self {
        Self { inner, token }
    }

    /// Underlying storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Storage> Storage for CancellableStorage<S> {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        self.token.check()?;
        self.inner.get(key)
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        self.token.check()?;
        self.inner.put(entry)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.token.check()?;
        self.inner.delete(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.token.check()?;
        self.inner.list(prefix)
    }
}
