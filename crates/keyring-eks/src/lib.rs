//! Encrypted Key Storage
//!
//! Wraps a [`Storage`](keyring_storage::Storage) so that stored paths reveal
//! nothing about the logical paths behind them, while get, put, delete and
//! hierarchical list keep working. Every path segment is encrypted with a
//! derived, convergent keyring policy: identical logical paths always
//! produce identical stored paths.
//!
//! ```text
//! put("users/alice", v)
//!        │
//!        ▼
//! encryptedkeys/3kTm...Qz/9bPx...Lr  ──►  backing storage
//!
//! list("users/")  ──►  decrypt each child name  ──►  ["alice", "bob/"]
//! ```
//!
//! Decrypted names are cached in a [`TwoQueueCache`] keyed by their stored
//! form, so repeated listings skip the decryption.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cache;
mod error;
pub mod path;
mod storage;

pub use cache::{DEFAULT_CACHE_SIZE, TwoQueueCache};
pub use error::EksError;
pub use storage::{DEFAULT_PREFIX, EksConfig, EncryptedKeyStorage, EncryptedKeyStorageBuilder};
