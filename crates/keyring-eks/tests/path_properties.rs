//! Property-based tests for path encryption.

use std::sync::Arc;

use keyring_core::{KeyType, Policy, SystemEnv};
use keyring_eks::{EksConfig, EncryptedKeyStorage, path};
use keyring_storage::{MemoryStorage, StorageEntry};
use proptest::prelude::*;

fn eks() -> EncryptedKeyStorage<MemoryStorage> {
    let mut policy = Policy::new("paths", KeyType::Aes256Gcm96);
    policy.derived = true;
    policy.convergent_encryption = true;
    policy.convergent_version = 2;
    policy.rotate(&MemoryStorage::new(), &SystemEnv::new()).unwrap();
    EncryptedKeyStorage::new(MemoryStorage::new(), Arc::new(policy), EksConfig::default()).unwrap()
}

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,12}"
}

fn logical_path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..5).prop_map(|segments| segments.join("/"))
}

/// Property: path encryption is deterministic
#[test]
fn prop_encrypt_path_is_deterministic() {
    let eks = eks();
    proptest!(|(p in logical_path())| {
        prop_assert_eq!(eks.encrypt_path(&p)?, eks.encrypt_path(&p)?);
    });
}

/// Property: distinct clean paths encrypt to distinct stored paths
#[test]
fn prop_encrypt_path_is_injective() {
    let eks = eks();
    proptest!(|(p in logical_path(), q in logical_path())| {
        prop_assume!(p != q);
        prop_assert_ne!(eks.encrypt_path(&p)?, eks.encrypt_path(&q)?);
    });
}

/// Property: the stored path has one segment per logical segment
#[test]
fn prop_encrypt_path_preserves_depth() {
    let eks = eks();
    proptest!(|(p in logical_path())| {
        let encrypted = eks.encrypt_path(&p)?;
        let depth = encrypted.trim_start_matches("encryptedkeys/").split('/').count();
        prop_assert_eq!(depth, p.split('/').count());
    });
}

/// Property: whatever is put can be listed back under its parent
#[test]
fn prop_put_then_list_finds_leaf() {
    proptest!(ProptestConfig::with_cases(64), |(parent in logical_path(), leaf in segment())| {
        let eks = eks();
        eks.put(&StorageEntry::new(format!("{parent}/{leaf}"), b"v".to_vec()))?;
        prop_assert_eq!(eks.list(&parent)?, vec![leaf.clone()]);
        let full = format!("{parent}/{leaf}");
        prop_assert!(eks.get(&full)?.is_some());
    });
}

/// Property: cleaning is idempotent
#[test]
fn prop_clean_is_idempotent() {
    proptest!(|(p in "[a-z./]{0,24}")| {
        let once = path::clean(&p);
        prop_assert_eq!(path::clean(&once), once.clone());
    });
}
