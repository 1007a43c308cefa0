//! Signature and HMAC options.

use std::{fmt, str::FromStr};

use hmac::{Hmac, Mac, digest::KeyInit};
use rsa::{Pkcs1v15Sign, Pss};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::KeyringError;

/// Digest used for prehashing signature input, RSA padding and HMAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-224
    Sha2_224,
    /// SHA-256
    #[default]
    Sha2_256,
    /// SHA-384
    Sha2_384,
    /// SHA-512
    Sha2_512,
}

impl HashAlgorithm {
    /// Canonical name, e.g. `sha2-256`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha2_224 => "sha2-224",
            Self::Sha2_256 => "sha2-256",
            Self::Sha2_384 => "sha2-384",
            Self::Sha2_512 => "sha2-512",
        }
    }

    /// Hash `input`.
    pub fn digest(self, input: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha2_224 => Sha224::digest(input).to_vec(),
            Self::Sha2_256 => Sha256::digest(input).to_vec(),
            Self::Sha2_384 => Sha384::digest(input).to_vec(),
            Self::Sha2_512 => Sha512::digest(input).to_vec(),
        }
    }

    pub(crate) fn hmac(self, key: &[u8], input: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha2_224 => mac::<Hmac<Sha224>>(key, input).finalize().into_bytes().to_vec(),
            Self::Sha2_256 => mac::<Hmac<Sha256>>(key, input).finalize().into_bytes().to_vec(),
            Self::Sha2_384 => mac::<Hmac<Sha384>>(key, input).finalize().into_bytes().to_vec(),
            Self::Sha2_512 => mac::<Hmac<Sha512>>(key, input).finalize().into_bytes().to_vec(),
        }
    }

    /// Constant-time tag comparison.
    pub(crate) fn verify_hmac(self, key: &[u8], input: &[u8], tag: &[u8]) -> bool {
        match self {
            Self::Sha2_224 => mac::<Hmac<Sha224>>(key, input).verify_slice(tag).is_ok(),
            Self::Sha2_256 => mac::<Hmac<Sha256>>(key, input).verify_slice(tag).is_ok(),
            Self::Sha2_384 => mac::<Hmac<Sha384>>(key, input).verify_slice(tag).is_ok(),
            Self::Sha2_512 => mac::<Hmac<Sha512>>(key, input).verify_slice(tag).is_ok(),
        }
    }

    pub(crate) fn pss(self) -> Pss {
        match self {
            Self::Sha2_224 => Pss::new::<Sha224>(),
            Self::Sha2_256 => Pss::new::<Sha256>(),
            Self::Sha2_384 => Pss::new::<Sha384>(),
            Self::Sha2_512 => Pss::new::<Sha512>(),
        }
    }

    pub(crate) fn pkcs1v15(self) -> Pkcs1v15Sign {
        match self {
            Self::Sha2_224 => Pkcs1v15Sign::new::<Sha224>(),
            Self::Sha2_256 => Pkcs1v15Sign::new::<Sha256>(),
            Self::Sha2_384 => Pkcs1v15Sign::new::<Sha384>(),
            Self::Sha2_512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}

fn mac<M: Mac + KeyInit>(key: &[u8], input: &[u8]) -> M {
    let Ok(mut mac) = <M as KeyInit>::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(input);
    mac
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha2-224" => Ok(Self::Sha2_224),
            "sha2-256" => Ok(Self::Sha2_256),
            "sha2-384" => Ok(Self::Sha2_384),
            "sha2-512" => Ok(Self::Sha2_512),
            other => Err(KeyringError::InvalidInput(format!("unsupported hash algorithm {other}"))),
        }
    }
}

/// RSA signature padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RsaPadding {
    /// RSASSA-PSS
    #[default]
    Pss,
    /// RSASSA-PKCS1-v1_5
    Pkcs1v15,
}

impl FromStr for RsaPadding {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pss" => Ok(Self::Pss),
            "pkcs1v15" => Ok(Self::Pkcs1v15),
            other => Err(KeyringError::InvalidInput(format!("unsupported rsa signature algorithm {other}"))),
        }
    }
}

/// Signature byte layout inside the envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Marshaling {
    /// DER for ECDSA, raw bytes otherwise; standard base64
    #[default]
    Asn1,
    /// Fixed-width `r || s` for ECDSA; unpadded base64url
    Jws,
}

impl FromStr for Marshaling {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asn1" => Ok(Self::Asn1),
            "jws" => Ok(Self::Jws),
            other => Err(KeyringError::InvalidInput(format!("unsupported marshaling type {other}"))),
        }
    }
}

/// Knobs for [`Policy::sign`](crate::Policy::sign) and
/// [`Policy::verify_signature`](crate::Policy::verify_signature).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Digest for prehashing and RSA padding
    pub hash: HashAlgorithm,
    /// RSA padding scheme
    pub rsa_padding: RsaPadding,
    /// Signature encoding
    pub marshaling: Marshaling,
    /// Input is already a digest of `hash`; skip hashing for ECDSA/RSA
    pub prehashed: bool,
}

impl SignOptions {
    /// Defaults with the given hash.
    pub fn with_hash(hash: HashAlgorithm) -> Self {
        Self { hash, ..Self::default() }
    }
}

/// Output of a signing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    /// `vault:v<N>:<signature>`
    pub signature: String,
    /// Public key of a derived Ed25519 key, which is not stored anywhere
    pub public_key: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names() {
        assert_eq!("sha2-384".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha2_384);
        assert_eq!("pkcs1v15".parse::<RsaPadding>().unwrap(), RsaPadding::Pkcs1v15);
        assert_eq!("jws".parse::<Marshaling>().unwrap(), Marshaling::Jws);

        let err = "md5".parse::<HashAlgorithm>().unwrap_err();
        assert!(err.is_user_error());
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(HashAlgorithm::Sha2_224.digest(b"x").len(), 28);
        assert_eq!(HashAlgorithm::Sha2_256.digest(b"x").len(), 32);
        assert_eq!(HashAlgorithm::Sha2_384.digest(b"x").len(), 48);
        assert_eq!(HashAlgorithm::Sha2_512.digest(b"x").len(), 64);
    }

    #[test]
    fn hmac_verifies_only_matching_tag() {
        for hash in [HashAlgorithm::Sha2_224, HashAlgorithm::Sha2_512] {
            let tag = hash.hmac(b"key", b"input");
            assert!(hash.verify_hmac(b"key", b"input", &tag));
            assert!(!hash.verify_hmac(b"key", b"other", &tag));
            assert!(!hash.verify_hmac(b"other", b"input", &tag));
        }
    }
}
