//! Key/value storage abstraction for the keyring.
//!
//! Policies, archives and encrypted key blobs all live behind the small
//! [`Storage`] trait. The trait is synchronous; implementations share their
//! state through `Arc`, so clones observe the same underlying data.

mod cancel;
mod chaotic;
mod error;
mod memory;
mod redb;

use std::collections::BTreeSet;

pub use cancel::{CancelToken, CancellableStorage};
pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// A single stored value and the path it lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Full storage path.
    pub key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Create an entry from anything string-like and byte-like.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Opaque key/value store consumed by policies and encrypted key storage.
///
/// Must be Clone (shared between the lock manager and wrappers), Send + Sync
/// (used from many threads) and synchronous.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned. Acceptable for test code, the durable backend never does.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Fetch the entry at `key`. `None` if nothing is stored there.
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError>;

    /// Store `entry`, overwriting any previous value.
    fn put(&self, entry: &StorageEntry) -> Result<(), StorageError>;

    /// Remove the entry at `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Immediate children of `prefix`.
    ///
    /// Child directories carry a trailing `/`. Ordering is not part of the
    /// contract.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Collapse full keys under `prefix` into their immediate children.
pub(crate) fn immediate_children<'a>(
    prefix: &str,
    keys: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut children = BTreeSet::new();
    for key in keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.find('/') {
            Some(idx) => children.insert(rest[..=idx].to_string()),
            None => children.insert(rest.to_string()),
        };
    }
    children.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_collapse_nested_paths() {
        let keys = ["a/b", "a/c/d", "a/c/e", "b/x", "a/"];
        let children = immediate_children("a/", keys);
        assert_eq!(children, vec!["b".to_string(), "c/".to_string()]);
    }

    #[test]
    fn children_of_empty_prefix_are_top_level() {
        let keys = ["policy/a", "archive/a", "top"];
        let children = immediate_children("", keys);
        assert_eq!(children, vec!["archive/", "policy/", "top"]);
    }
}
