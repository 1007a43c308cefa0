//! Keyring Cryptographic Primitives
//!
//! Pure functions used by the policy engine and encrypted key storage.
//! Nothing here touches storage or draws randomness: nonces and key material
//! are always supplied by the caller.
//!
//! ```text
//! keys[v].key ──► KDF(context) ──► per-request key
//!                                        │
//!                 nonce ─────────────────┤
//!                                        ▼
//!                                  AES-256-GCM ──► vault:v<N>:<base64>
//! ```
//!
//! # Modules
//!
//! - [`kdf`]: counter-mode KDF over an arbitrary PRF, HKDF-SHA256 expansion
//! - [`aead`]: AES-256-GCM with a 96-bit nonce, convergent nonce derivation
//! - [`base62`]: big-integer radix-62 codec for path segments
//! - [`envelope`]: the `vault:v<N>:` versioned envelope

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod base62;
pub mod envelope;
mod error;
pub mod kdf;

pub use aead::{KEY_SIZE, NONCE_SIZE, TAG_SIZE, convergent_nonce, open, seal};
pub use envelope::{Envelope, InvalidCiphertextReason};
pub use error::CryptoError;
pub use kdf::{HMAC_SHA256_PRF_LEN, counter_mode, hkdf_sha256, hmac_sha256_prf};
