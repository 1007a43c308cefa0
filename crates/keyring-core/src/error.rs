//! Error types for the keyring core.
//!
//! Every error is either the caller's fault (bad input, wrong version,
//! unsupported operation) or ours (storage, serialization, a crypto library
//! failing). [`KeyringError::kind`] tells them apart and
//! [`KeyringError::code`] gives a stable identifier for each.

use keyring_crypto::{CryptoError, InvalidCiphertextReason};
use keyring_storage::StorageError;
use thiserror::Error;

use crate::KeyType;

/// Which side an error is blamed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request; retrying unchanged will fail again
    User,
    /// Failure inside the keyring or its storage
    Internal,
}

/// Errors from policy operations and the lock manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    /// Operation not available for the policy's key type
    #[error("{operation} not supported for key type {key_type}")]
    UnsupportedOperation {
        /// Operation attempted
        operation: &'static str,
        /// Key type of the policy
        key_type: KeyType,
    },

    /// Requested key version outside the usable range
    #[error("invalid key version: {0}")]
    InvalidVersion(String),

    /// Envelope version below the minimum decryption version
    #[error("ciphertext or signature version is disallowed by policy (too old)")]
    TooOld,

    /// Malformed or undecryptable envelope
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(InvalidCiphertextReason),

    /// Malformed request input (plaintext encoding, nonce, hash name)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Derived policy used without a context
    #[error(
        "missing context for key derivation; the key was created using a derived key, which \
         means additional per-request information must be included"
    )]
    MissingContext,

    /// No policy stored under this name
    #[error("policy {0} not found")]
    PolicyNotFound(String),

    /// Delete attempted on a policy with `deletion_allowed = false`
    #[error("deletion is not allowed for policy {0}")]
    DeletionNotAllowed(String),

    /// No policy may be stored under this name because one already is
    #[error("policy {0} already exists")]
    PolicyExists(String),

    /// Backup attempted on a policy that does not permit it
    #[error("{0}")]
    BackupNotAllowed(&'static str),

    /// Rejected key type / derivation / convergence combination or config
    /// value
    #[error("invalid policy configuration: {0}")]
    InvalidPolicyConfig(String),

    /// Policy state breaks a structural invariant; nothing was changed
    #[error("policy invariant violated: {0}")]
    InvariantViolation(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Policy or archive record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cryptographic library failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeyringError {
    /// User or internal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedOperation { .. }
            | Self::InvalidVersion(_)
            | Self::TooOld
            | Self::InvalidCiphertext(_)
            | Self::InvalidInput(_)
            | Self::MissingContext
            | Self::PolicyNotFound(_)
            | Self::DeletionNotAllowed(_)
            | Self::PolicyExists(_)
            | Self::BackupNotAllowed(_)
            | Self::InvalidPolicyConfig(_) => ErrorKind::User,
            Self::InvariantViolation(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller is to blame.
    pub fn is_user_error(&self) -> bool {
        self.kind() == ErrorKind::User
    }

    /// Stable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedOperation { .. } => "unsupported_key_type_for_operation",
            Self::InvalidVersion(_) => "invalid_version",
            Self::TooOld => "too_old",
            Self::InvalidCiphertext(_) => "invalid_ciphertext",
            Self::InvalidInput(_) => "invalid_input",
            Self::MissingContext => "missing_context",
            Self::PolicyNotFound(_) => "policy_not_found",
            Self::DeletionNotAllowed(_) => "deletion_not_allowed",
            Self::PolicyExists(_) => "policy_exists",
            Self::BackupNotAllowed(_) => "backup_not_allowed",
            Self::InvalidPolicyConfig(_) => "invalid_policy_config",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    pub(crate) fn unsupported(operation: &'static str, key_type: KeyType) -> Self {
        Self::UnsupportedOperation { operation, key_type }
    }
}

impl From<InvalidCiphertextReason> for KeyringError {
    fn from(reason: InvalidCiphertextReason) -> Self {
        Self::InvalidCiphertext(reason)
    }
}

impl From<CryptoError> for KeyringError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed => {
                Self::InvalidCiphertext(InvalidCiphertextReason::DecryptFailed)
            },
            CryptoError::InvalidCiphertext(reason) => Self::InvalidCiphertext(reason),
            CryptoError::InvalidNonceLength { expected, got } => {
                Self::InvalidInput(format!("nonce must be {expected} bytes long, got {got}"))
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_failures_are_user_errors() {
        let err = KeyringError::from(CryptoError::DecryptionFailed);
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.code(), "invalid_ciphertext");
        assert_eq!(err, KeyringError::InvalidCiphertext(InvalidCiphertextReason::DecryptFailed));
    }

    #[test]
    fn storage_failures_are_internal() {
        let err = KeyringError::from(StorageError::Io("disk".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), "storage");
        assert!(!err.is_user_error());
    }

    #[test]
    fn too_old_has_stable_code() {
        assert_eq!(KeyringError::TooOld.code(), "too_old");
        assert!(KeyringError::TooOld.is_user_error());
    }
}
