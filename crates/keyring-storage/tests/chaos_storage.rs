//! Chaos property tests for Storage implementations
//!
//! Under `ChaoticStorage` every call either takes full effect or none:
//! - A failed put leaves the previous value in place
//! - A successful put is visible to the next successful get
//! - Listings only ever contain children that were successfully written

use std::collections::BTreeMap;

use keyring_storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageEntry};
use proptest::prelude::*;
use tempfile::tempdir;

fn check_against_model(storage: &impl Storage, model: &BTreeMap<String, Vec<u8>>) {
    for (key, value) in model {
        let entry = storage.get(key).unwrap();
        assert_eq!(entry.map(|e| e.value).as_ref(), Some(value), "key {key}");
    }
}

#[test]
fn prop_chaos_writes_are_atomic() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        writes in prop::collection::vec((0u8..8, any::<u8>()), 1..64),
    )| {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let mut model = BTreeMap::new();

        for (slot, byte) in writes {
            let key = format!("dir/{slot}");
            if storage.put(&StorageEntry::new(key.clone(), vec![byte])).is_ok() {
                model.insert(key, vec![byte]);
            }
        }

        // ORACLE: the inner store matches exactly the successful writes
        check_against_model(storage.inner(), &model);
        prop_assert_eq!(storage.inner().len(), model.len());

        let mut listed = storage.inner().list("dir/").unwrap();
        listed.sort();
        let expected: Vec<String> =
            model.keys().map(|k| k.trim_start_matches("dir/").to_string()).collect();
        prop_assert_eq!(listed, expected);
    });
}

#[test]
fn prop_chaos_deletes_are_atomic() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        deletes in prop::collection::vec(0u8..8, 1..16),
    )| {
        let memory = MemoryStorage::new();
        for slot in 0u8..8 {
            memory.put(&StorageEntry::new(format!("k/{slot}"), vec![slot])).unwrap();
        }
        let storage = ChaoticStorage::with_seed(memory, failure_rate, seed);
        let mut alive: BTreeMap<String, Vec<u8>> =
            (0u8..8).map(|s| (format!("k/{s}"), vec![s])).collect();

        for slot in deletes {
            let key = format!("k/{slot}");
            if storage.delete(&key).is_ok() {
                alive.remove(&key);
            }
        }

        check_against_model(storage.inner(), &alive);
        prop_assert_eq!(storage.inner().len(), alive.len());
    });
}

#[test]
fn redb_under_chaos_matches_model() {
    let dir = tempdir().unwrap();
    let storage = ChaoticStorage::with_seed(RedbStorage::open(dir.path().join("db")).unwrap(), 0.3, 42);
    let mut model = BTreeMap::new();

    for i in 0u8..50 {
        let key = format!("policy/{}", i % 10);
        if storage.put(&StorageEntry::new(key.clone(), vec![i])).is_ok() {
            model.insert(key, vec![i]);
        }
    }

    assert!(storage.failure_count() > 0);
    check_against_model(storage.inner(), &model);
}
