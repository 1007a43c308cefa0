use thiserror::Error;

use crate::envelope::InvalidCiphertextReason;

/// Errors from the keyring primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Counter-mode KDF called with a length that is not a whole number of
    /// bytes (or a zero PRF length)
    #[error("{what} must be a non-zero multiple of 8, got {bits}")]
    InvalidBitLength {
        /// Which parameter was wrong
        what: &'static str,
        /// Offending value
        bits: u32,
    },

    /// The PRF or HKDF reader produced fewer bytes than requested
    #[error("key derivation produced {got} bytes, expected {expected}")]
    ShortOutput {
        /// Bytes requested
        expected: usize,
        /// Bytes produced
        got: usize,
    },

    /// Symmetric key of the wrong size
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength {
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },

    /// Nonce of the wrong size
    #[error("invalid nonce length: expected {expected}, got {got}")]
    InvalidNonceLength {
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },

    /// AEAD open failed (wrong key or tampered data, indistinguishable)
    #[error("unable to decrypt")]
    DecryptionFailed,

    /// Character outside `0-9A-Za-z` or empty input
    #[error("invalid base62 input")]
    InvalidBase62,

    /// Malformed `vault:v<N>:` envelope
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(InvalidCiphertextReason),
}

impl From<InvalidCiphertextReason> for CryptoError {
    fn from(reason: InvalidCiphertextReason) -> Self {
        Self::InvalidCiphertext(reason)
    }
}
