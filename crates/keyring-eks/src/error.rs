//! Encrypted key storage errors.

use keyring_core::KeyringError;
use keyring_storage::StorageError;
use thiserror::Error;

/// Errors from [`EncryptedKeyStorage`](crate::EncryptedKeyStorage).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EksError {
    /// The policy does not derive per-context keys
    #[error("policy must have derived keys enabled")]
    PolicyDerivedRequired,

    /// The policy does not encrypt convergently
    #[error("policy must have convergent encryption enabled")]
    PolicyConvergentRequired,

    /// The policy uses caller-supplied convergent nonces
    #[error("policy must have convergent version 2 or greater")]
    PolicyConvergentVersionRequired,

    /// Built without a backing storage
    #[error("nil storage provided")]
    NilStorage,

    /// Built without a policy
    #[error("nil policy provided")]
    NilPolicy,

    /// A listed name could not be decoded back to a path segment
    #[error("could not decode key: {0}")]
    DecodeFailed(String),

    /// Encrypting or decrypting a segment failed
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// The backing storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EksError {
    /// Stable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PolicyDerivedRequired => "policy_derived_required",
            Self::PolicyConvergentRequired => "policy_convergent_required",
            Self::PolicyConvergentVersionRequired => "policy_convergent_version_required",
            Self::NilStorage => "nil_storage",
            Self::NilPolicy => "nil_policy",
            Self::DecodeFailed(_) => "decode_failed",
            Self::Keyring(err) => err.code(),
            Self::Storage(_) => "storage",
        }
    }
}
