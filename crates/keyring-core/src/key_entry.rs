//! One version of key material.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use p256::{
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{EncodePublicKey as _, LineEnding},
};
use rsa::{
    RsaPrivateKey,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    Environment, KeyType, KeyringError,
    encoding::{base64_bytes, base64_opt, decimal_opt},
};

/// Size of every version's HMAC key.
pub const HMAC_KEY_SIZE: usize = 32;

/// Key material and metadata for a single version.
///
/// Only the fields the policy's [`KeyType`] needs are populated:
///
/// | Type | `key` | `ec_*` | `rsa_key` | `public_key` |
/// |---|---|---|---|---|
/// | AES-256-GCM96 | 32-byte key | | | |
/// | ECDSA-P256 | | x, y, d | | PEM |
/// | Ed25519 | 64-byte keypair | | | base64 |
/// | RSA | | | PKCS#1 DER | PEM |
///
/// `hmac_key` is always 32 random bytes. Secret fields are zeroed on drop.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Symmetric key, or Ed25519 seed followed by public key
    #[serde(with = "base64_bytes", default)]
    pub key: Vec<u8>,

    /// Per-version HMAC key
    #[serde(with = "base64_bytes", default)]
    pub hmac_key: Vec<u8>,

    /// Creation time (authoritative)
    #[serde(rename = "time", default)]
    pub creation_time: DateTime<Utc>,

    /// ECDSA public X coordinate
    #[serde(with = "decimal_opt", default, skip_serializing_if = "Option::is_none")]
    pub ec_x: Option<BigUint>,

    /// ECDSA public Y coordinate
    #[serde(with = "decimal_opt", default, skip_serializing_if = "Option::is_none")]
    pub ec_y: Option<BigUint>,

    /// ECDSA private scalar
    #[serde(with = "decimal_opt", default, skip_serializing_if = "Option::is_none")]
    pub ec_d: Option<BigUint>,

    /// RSA private key, PKCS#1 DER
    #[serde(with = "base64_opt", default, skip_serializing_if = "Option::is_none")]
    pub rsa_key: Option<Vec<u8>>,

    /// Public half rendered for export
    #[serde(rename = "public_key", default, skip_serializing_if = "String::is_empty")]
    pub formatted_public_key: String,

    /// Creation time as Unix seconds, written alongside `time`
    #[serde(rename = "creation_time", default)]
    pub deprecated_creation_time: i64,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("creation_time", &self.creation_time)
            .field("has_hmac_key", &!self.hmac_key.is_empty())
            .field("public_key", &self.formatted_public_key)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyEntry {
    fn drop(&mut self) {
        self.key.zeroize();
        self.hmac_key.zeroize();
        if let Some(der) = self.rsa_key.as_mut() {
            der.zeroize();
        }
    }
}

impl KeyEntry {
    /// Generate fresh material for `key_type`, stamped with `env.now()`.
    pub fn generate<E: Environment>(key_type: KeyType, env: &E) -> Result<Self, KeyringError> {
        let mut entry = Self::stamped(env.now());

        entry.hmac_key = vec![0u8; HMAC_KEY_SIZE];
        env.random_bytes(&mut entry.hmac_key);

        match key_type {
            KeyType::Aes256Gcm96 => {
                entry.key = vec![0u8; keyring_crypto::KEY_SIZE];
                env.random_bytes(&mut entry.key);
            },
            KeyType::EcdsaP256 => {
                let secret = p256::SecretKey::random(&mut env.rng());
                let public = secret.public_key();
                let point = public.to_encoded_point(false);
                let (Some(x), Some(y)) = (point.x(), point.y()) else {
                    unreachable!("uncompressed points carry both coordinates");
                };

                entry.ec_x = Some(BigUint::from_bytes_be(x));
                entry.ec_y = Some(BigUint::from_bytes_be(y));
                entry.ec_d = Some(BigUint::from_bytes_be(&secret.to_bytes()));
                entry.formatted_public_key = public
                    .to_public_key_pem(LineEnding::LF)
                    .map_err(|e| KeyringError::Internal(format!("error marshaling public key: {e}")))?;
            },
            KeyType::Ed25519 => {
                let mut seed = [0u8; ed25519_dalek::SECRET_KEY_LENGTH];
                env.random_bytes(&mut seed);
                let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
                seed.zeroize();

                entry.key = signing.to_keypair_bytes().to_vec();
                entry.formatted_public_key = STANDARD.encode(signing.verifying_key().as_bytes());
            },
            KeyType::Rsa2048 | KeyType::Rsa4096 => {
                let bits = key_type.rsa_bits().unwrap_or(2048);
                let private = RsaPrivateKey::new(&mut env.rng(), bits)
                    .map_err(|e| KeyringError::Internal(format!("RSA key generation failed: {e}")))?;
                let der = private
                    .to_pkcs1_der()
                    .map_err(|e| KeyringError::Internal(format!("error encoding RSA key: {e}")))?;

                entry.rsa_key = Some(der.as_bytes().to_vec());
                entry.formatted_public_key = rsa::pkcs8::EncodePublicKey::to_public_key_pem(
                    &private.to_public_key(),
                    rsa::pkcs8::LineEnding::LF,
                )
                .map_err(|e| KeyringError::Internal(format!("error marshaling public key: {e}")))?;
            },
        }

        Ok(entry)
    }

    /// Empty entry with both timestamp fields set.
    pub(crate) fn stamped(now: DateTime<Utc>) -> Self {
        let mut entry = Self::default();
        entry.creation_time = now;
        entry.deprecated_creation_time = now.timestamp();
        entry
    }

    /// ECDSA signing key from the stored private scalar.
    pub fn ecdsa_signing_key(&self) -> Result<p256::ecdsa::SigningKey, KeyringError> {
        let d = self.ec_d.as_ref().ok_or_else(|| missing("ECDSA private scalar"))?;
        p256::ecdsa::SigningKey::from_slice(&fixed_width(d)?)
            .map_err(|_| KeyringError::Internal("stored ECDSA scalar is invalid".into()))
    }

    /// ECDSA verifying key from the stored public coordinates.
    pub fn ecdsa_verifying_key(&self) -> Result<p256::ecdsa::VerifyingKey, KeyringError> {
        let (Some(x), Some(y)) = (self.ec_x.as_ref(), self.ec_y.as_ref()) else {
            return Err(missing("ECDSA public point"));
        };

        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(&fixed_width(x)?);
        sec1.extend_from_slice(&fixed_width(y)?);

        p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|_| KeyringError::Internal("stored ECDSA point is invalid".into()))
    }

    /// Ed25519 signing key from the stored keypair bytes.
    pub fn ed25519_signing_key(&self) -> Result<ed25519_dalek::SigningKey, KeyringError> {
        let bytes: &[u8; ed25519_dalek::KEYPAIR_LENGTH] =
            self.key.as_slice().try_into().map_err(|_| missing("Ed25519 keypair"))?;
        ed25519_dalek::SigningKey::from_keypair_bytes(bytes)
            .map_err(|_| KeyringError::Internal("stored Ed25519 keypair is inconsistent".into()))
    }

    /// RSA private key parsed from the stored DER.
    pub fn rsa_private_key(&self) -> Result<RsaPrivateKey, KeyringError> {
        let der = self.rsa_key.as_deref().ok_or_else(|| missing("RSA private key"))?;
        RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| KeyringError::Internal(format!("stored RSA key is invalid: {e}")))
    }
}

fn missing(what: &str) -> KeyringError {
    KeyringError::Internal(format!("key entry has no {what}"))
}

/// Left-pad a P-256 field element to 32 bytes.
fn fixed_width(value: &BigUint) -> Result<[u8; 32], KeyringError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(KeyringError::Internal("ECDSA field element exceeds 32 bytes".into()));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}
