//! Redb-backed durable storage.
//!
//! Every call runs in its own ACID transaction, so a crash never leaves a
//! half-written value behind.

use std::{path::Path, sync::Arc};

use redb::{Database, TableDefinition};

use crate::{Storage, StorageEntry, StorageError, immediate_children};

/// Table: entries
/// Key: full storage path
/// Value: raw bytes
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(ENTRIES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn io(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

impl Storage for RedbStorage {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ENTRIES).map_err(io)?;

        let value = table.get(key).map_err(io)?;
        Ok(value.map(|v| StorageEntry::new(key, v.value().to_vec())))
    }

    fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(io)?;
            table.insert(entry.key.as_str(), entry.value.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(io)?;
            table.remove(key).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ENTRIES).map_err(io)?;

        let mut keys = Vec::new();
        for result in table.range(prefix..).map_err(io)? {
            let (key, _) = result.map_err(io)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }

        Ok(immediate_children(prefix, keys.iter().map(String::as_str)))
    }
}
