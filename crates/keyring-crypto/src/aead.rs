//! AES-256-GCM with a 96-bit nonce and 128-bit tag.
//!
//! The nonce is always supplied by the caller: random for ordinary
//! encryption, [`convergent_nonce`] for convergent encryption.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

/// AES-256 key size.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size.
pub const NONCE_SIZE: usize = 12;

/// GCM tag size.
pub const TAG_SIZE: usize = 16;

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_SIZE, got: key.len() })
}

fn check_nonce(nonce: &[u8]) -> Result<(), CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength { expected: NONCE_SIZE, got: nonce.len() });
    }
    Ok(())
}

/// Encrypt `plaintext`, returning `ciphertext || tag` (nonce not included).
#[allow(deprecated)] // generic-array 0.14 `from_slice`; length checked above
pub fn seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;
    check_nonce(nonce)?;

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(nonce), plaintext) else {
        unreachable!("AES-GCM encryption cannot fail below the 64 GiB message limit");
    };
    Ok(ciphertext)
}

/// Decrypt `ciphertext || tag`.
///
/// # Errors
///
/// `DecryptionFailed` for any authentication failure.
#[allow(deprecated)] // generic-array 0.14 `from_slice`; length checked above
pub fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;
    check_nonce(nonce)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Deterministic nonce for convergent encryption:
/// the first 12 bytes of `HMAC-SHA256(key = context, plaintext)`.
pub fn convergent_nonce(context: &[u8], plaintext: &[u8]) -> [u8; NONCE_SIZE] {
    let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(context) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(plaintext);
    let tag = mac.finalize().into_bytes();

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&tag[..NONCE_SIZE]);
    nonce
}
