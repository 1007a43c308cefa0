//! Archive of every key version ever created for a policy.
//!
//! Stored under `archive/<name>` as `{"keys": [...]}`. Position `i` holds
//! version `i`; position 0 is an empty sentinel.

use keyring_storage::{Storage, StorageEntry};
use serde::{Deserialize, Serialize};

use crate::{KeyEntry, KeyringError};

/// Storage prefix for archive records.
pub const ARCHIVE_PREFIX: &str = "archive/";

/// All key versions of one policy, indexed by version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedKeys {
    /// `keys[v]` is version `v`; `keys[0]` is a sentinel
    pub keys: Vec<KeyEntry>,
}

impl Default for ArchivedKeys {
    fn default() -> Self {
        Self { keys: vec![KeyEntry::default()] }
    }
}

impl ArchivedKeys {
    /// Highest version slot in the archive.
    pub fn latest_slot(&self) -> u32 {
        self.keys.len().saturating_sub(1) as u32
    }

    /// Entry for `version`, if archived. The sentinel is never returned.
    pub fn get(&self, version: u32) -> Option<&KeyEntry> {
        if version == 0 {
            return None;
        }
        self.keys.get(version as usize)
    }
}

/// Storage path of the archive for `name`.
pub fn archive_path(name: &str) -> String {
    format!("{ARCHIVE_PREFIX}{name}")
}

/// Load the archive for `name`; a missing record yields an empty archive.
pub fn load_archive<S: Storage>(storage: &S, name: &str) -> Result<ArchivedKeys, KeyringError> {
    match storage.get(&archive_path(name))? {
        Some(entry) => Ok(serde_json::from_slice(&entry.value)?),
        None => Ok(ArchivedKeys::default()),
    }
}

pub(crate) fn store_archive<S: Storage>(
    storage: &S,
    name: &str,
    archive: &ArchivedKeys,
) -> Result<(), KeyringError> {
    let value = serde_json::to_vec(archive)?;
    storage.put(&StorageEntry::new(archive_path(name), value))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use keyring_storage::MemoryStorage;

    use super::*;

    #[test]
    fn missing_archive_is_sentinel_only() {
        let storage = MemoryStorage::new();
        let archive = load_archive(&storage, "nope").unwrap();
        assert_eq!(archive.keys.len(), 1);
        assert_eq!(archive.latest_slot(), 0);
        assert!(archive.get(0).is_none());
    }

    #[test]
    fn stored_shape_is_keys_array() {
        let storage = MemoryStorage::new();
        store_archive(&storage, "k", &ArchivedKeys::default()).unwrap();

        let raw = storage.get("archive/k").unwrap().unwrap().value;
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["keys"].as_array().map(Vec::len), Some(1));
        assert_eq!(load_archive(&storage, "k").unwrap(), ArchivedKeys::default());
    }
}
