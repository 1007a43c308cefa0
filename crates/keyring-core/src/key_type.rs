//! Key types, their capabilities, and the KDF selector.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Algorithm family of every key version in a policy.
///
/// Serialized as its integer tag so stored records stay compact and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum KeyType {
    /// AES-256 in GCM mode with a 96-bit nonce
    Aes256Gcm96,
    /// ECDSA over NIST P-256
    EcdsaP256,
    /// Ed25519 signatures
    Ed25519,
    /// 2048-bit RSA
    Rsa2048,
    /// 4096-bit RSA
    Rsa4096,
}

impl KeyType {
    /// Every key type, in tag order.
    pub const ALL: [KeyType; 5] =
        [Self::Aes256Gcm96, Self::EcdsaP256, Self::Ed25519, Self::Rsa2048, Self::Rsa4096];

    /// Can produce ciphertexts.
    pub fn encryption_supported(self) -> bool {
        matches!(self, Self::Aes256Gcm96 | Self::Rsa2048 | Self::Rsa4096)
    }

    /// Can open ciphertexts.
    pub fn decryption_supported(self) -> bool {
        self.encryption_supported()
    }

    /// Can produce signatures.
    pub fn signing_supported(self) -> bool {
        matches!(self, Self::EcdsaP256 | Self::Ed25519 | Self::Rsa2048 | Self::Rsa4096)
    }

    /// Supports per-request key derivation.
    pub fn derivation_supported(self) -> bool {
        matches!(self, Self::Aes256Gcm96 | Self::Ed25519)
    }

    /// Signing input is expected to be a digest. Ed25519 hashes internally.
    pub fn hash_signature_input(self) -> bool {
        matches!(self, Self::EcdsaP256 | Self::Rsa2048 | Self::Rsa4096)
    }

    /// RSA modulus size, if this is an RSA type.
    pub fn rsa_bits(self) -> Option<usize> {
        match self {
            Self::Rsa2048 => Some(2048),
            Self::Rsa4096 => Some(4096),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes256Gcm96 => "aes256-gcm96",
            Self::EcdsaP256 => "ecdsa-p256",
            Self::Ed25519 => "ed25519",
            Self::Rsa2048 => "rsa-2048",
            Self::Rsa4096 => "rsa-4096",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown key type {s:?}"))
    }
}

impl From<KeyType> for u8 {
    fn from(value: KeyType) -> Self {
        match value {
            KeyType::Aes256Gcm96 => 0,
            KeyType::EcdsaP256 => 1,
            KeyType::Ed25519 => 2,
            KeyType::Rsa2048 => 3,
            KeyType::Rsa4096 => 4,
        }
    }
}

impl TryFrom<u8> for KeyType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(value as usize).copied().ok_or_else(|| format!("unknown key type tag {value}"))
    }
}

/// How derived keys are computed from a version's base key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum KdfMode {
    /// Counter-mode KDF with HMAC-SHA256 as the PRF
    HmacSha256Counter,
    /// HKDF-SHA256, context as `info`
    #[default]
    HkdfSha256,
}

impl From<KdfMode> for u8 {
    fn from(value: KdfMode) -> Self {
        match value {
            KdfMode::HmacSha256Counter => 0,
            KdfMode::HkdfSha256 => 1,
        }
    }
}

impl TryFrom<u8> for KdfMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::HmacSha256Counter),
            1 => Ok(Self::HkdfSha256),
            other => Err(format!("unknown kdf tag {other}")),
        }
    }
}
