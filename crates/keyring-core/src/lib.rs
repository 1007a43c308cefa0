//! Keyring Core
//!
//! Named, versioned keyrings ("policies") and the lock manager that hands
//! them out. A policy owns one key version per rotation; every ciphertext,
//! signature and HMAC it produces names the version that made it.
//!
//! # Storage Layout
//!
//! ```text
//! policy/<name>    JSON Policy, active versions only
//! archive/<name>   JSON { "keys": [sentinel, v1, v2, ...] }, every version
//! ```
//!
//! Raising `min_decryption_version` moves old versions out of the active map
//! but never out of the archive; lowering it rehydrates them. The archive is
//! always written before the active map is trimmed.
//!
//! A backup bundles the policy record with its archive; restoring one
//! writes the archive first, then the policy.
//!
//! # Versions
//!
//! ```text
//!   1 ... min_decryption ... min_encryption ... latest
//!   │          │                   │               │
//!   │          └─ decrypt/verify ──┴───────────────┤
//!   │                              └ encrypt/sign ─┘
//!   └ archived only
//! ```
//!
//! # Concurrency
//!
//! [`Policy`] is plain data. [`LockManager`] wraps each policy name in its
//! own read/write lock and optionally caches loaded policies. Randomness and
//! wall-clock time come from an [`Environment`] so tests can run against a
//! seeded RNG and a fixed clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod archive;
mod backup;
mod encoding;
mod env;
mod error;
mod key_entry;
mod key_type;
mod lock_manager;
mod ops;
mod policy;
mod sign;

pub use archive::{ARCHIVE_PREFIX, ArchivedKeys, archive_path, load_archive};
pub use backup::{PolicyBackup, VersionStamp};
pub use env::{EnvRng, Environment, SystemEnv};
pub use error::{ErrorKind, KeyringError};
pub use key_entry::{HMAC_KEY_SIZE, KeyEntry};
pub use key_type::{KdfMode, KeyType};
pub use keyring_storage::CancelToken;
pub use lock_manager::{
    LockManager, LockManagerConfig, PolicyReadGuard, PolicyRequest, PolicyWriteGuard,
};
pub use ops::PublicKeyInfo;
pub use policy::{POLICY_PREFIX, Policy, PolicyConfigUpdate, load_policy, policy_path};
pub use sign::{HashAlgorithm, Marshaling, RsaPadding, SignOptions, SigningResult};
