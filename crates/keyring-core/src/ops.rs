//! Cryptographic operations on a policy.

use std::borrow::Cow;

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, Verifier as _};
use keyring_crypto::{
    Envelope, HMAC_SHA256_PRF_LEN, InvalidCiphertextReason, NONCE_SIZE, aead, counter_mode, envelope,
    hkdf_sha256, hmac_sha256_prf,
};
use p256::ecdsa::signature::hazmat::{PrehashSigner as _, PrehashVerifier as _};
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
    Environment, HashAlgorithm, KdfMode, KeyEntry, KeyType, KeyringError, Marshaling, Policy,
    RsaPadding, SignOptions, SigningResult,
};

/// Size of derived AES keys and Ed25519 seeds.
const DERIVED_KEY_SIZE: usize = 32;

/// Public half of one key version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    /// Key version
    pub version: u32,
    /// When the version was created
    pub creation_time: DateTime<Utc>,
    /// PEM (ECDSA, RSA) or base64 (Ed25519)
    pub public_key: String,
}

impl Policy {
    fn key_entry(&self, version: u32) -> Result<&KeyEntry, KeyringError> {
        self.keys
            .get(&version)
            .ok_or_else(|| KeyringError::InvalidVersion(format!("key version {version} is not available")))
    }

    /// Resolve the version for encrypt, sign and HMAC. 0 means latest.
    fn encryption_version(&self, version: u32, operation: &str) -> Result<u32, KeyringError> {
        let version = if version == 0 { self.latest_version } else { version };
        if version > self.latest_version {
            return Err(KeyringError::InvalidVersion(format!(
                "requested version for {operation} is higher than the latest key version"
            )));
        }
        if version < self.min_encryption_version {
            return Err(KeyringError::InvalidVersion(format!(
                "requested version for {operation} is less than the minimum encryption key version"
            )));
        }
        Ok(version)
    }

    /// Enforce the version window on a parsed envelope.
    fn decryption_version(&self, version: u32) -> Result<u32, KeyringError> {
        if version > self.latest_version {
            return Err(KeyringError::InvalidVersion("version is too new".into()));
        }
        if self.min_decryption_version > 0 && version < self.min_decryption_version {
            return Err(KeyringError::TooOld);
        }
        Ok(version)
    }

    /// Key for `version` under `context`.
    ///
    /// Non-derived policies return the version's key unchanged. Derived
    /// policies return 32 bytes from the configured KDF: an AES key, or an
    /// Ed25519 seed.
    pub fn derive_key(&self, context: &[u8], version: u32) -> Result<Zeroizing<Vec<u8>>, KeyringError> {
        if !self.key_type.derivation_supported() {
            return Err(KeyringError::unsupported("key derivation", self.key_type));
        }
        if self.keys.is_empty() || self.latest_version == 0 {
            return Err(KeyringError::Internal("unable to access the key; no key versions found".into()));
        }
        if version == 0 || version > self.latest_version {
            return Err(KeyringError::InvalidVersion("invalid key version".into()));
        }

        let entry = self.key_entry(version)?;
        if !self.derived {
            return Ok(Zeroizing::new(entry.key.clone()));
        }
        if context.is_empty() {
            return Err(KeyringError::MissingContext);
        }

        let derived = match self.kdf {
            KdfMode::HmacSha256Counter => counter_mode(
                hmac_sha256_prf,
                HMAC_SHA256_PRF_LEN,
                &entry.key,
                context,
                (DERIVED_KEY_SIZE * 8) as u32,
            )?,
            KdfMode::HkdfSha256 => hkdf_sha256(&entry.key, context, DERIVED_KEY_SIZE)?,
        };
        Ok(Zeroizing::new(derived))
    }

    /// Encrypt base64 `plaintext` and return `vault:v<N>:<base64>`.
    ///
    /// `version` 0 selects the latest version. `nonce` is only read by
    /// convergent version 1 policies, which require it.
    pub fn encrypt<E: Environment>(
        &self,
        env: &E,
        version: u32,
        context: &[u8],
        nonce: Option<&[u8]>,
        plaintext: &str,
    ) -> Result<String, KeyringError> {
        if !self.key_type.encryption_supported() {
            return Err(KeyringError::unsupported("encryption", self.key_type));
        }

        let plaintext = Zeroizing::new(
            STANDARD
                .decode(plaintext)
                .map_err(|e| KeyringError::InvalidInput(format!("plaintext is not valid base64: {e}")))?,
        );
        let version = self.encryption_version(version, "encryption")?;

        let ciphertext = match self.key_type {
            KeyType::Aes256Gcm96 => {
                let key = self.derive_key(context, version)?;

                if self.uses_caller_nonce() {
                    let nonce = nonce.filter(|n| n.len() == NONCE_SIZE).ok_or_else(|| {
                        KeyringError::InvalidInput(format!(
                            "nonce must be {NONCE_SIZE} bytes long when using convergent encryption with this key"
                        ))
                    })?;
                    aead::seal(&key, nonce, &plaintext)?
                } else {
                    let nonce = if self.convergent_encryption {
                        aead::convergent_nonce(context, &plaintext)
                    } else {
                        let mut nonce = [0u8; NONCE_SIZE];
                        env.random_bytes(&mut nonce);
                        nonce
                    };
                    let mut out = nonce.to_vec();
                    out.extend_from_slice(&aead::seal(&key, &nonce, &plaintext)?);
                    out
                }
            },
            KeyType::Rsa2048 | KeyType::Rsa4096 => {
                let public = self.key_entry(version)?.rsa_private_key()?.to_public_key();
                public.encrypt(&mut env.rng(), Oaep::new::<Sha256>(), &plaintext).map_err(|e| match e {
                    rsa::Error::MessageTooLong => {
                        KeyringError::InvalidInput("plaintext is too long for this RSA key".into())
                    },
                    other => KeyringError::Internal(format!("RSA encryption failed: {other}")),
                })?
            },
            other => return Err(KeyringError::unsupported("encryption", other)),
        };

        Ok(envelope::render(version, &ciphertext))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt) and return
    /// the plaintext as base64.
    pub fn decrypt(
        &self,
        context: &[u8],
        nonce: Option<&[u8]>,
        value: &str,
    ) -> Result<String, KeyringError> {
        if !self.key_type.decryption_supported() {
            return Err(KeyringError::unsupported("decryption", self.key_type));
        }

        let parsed = Envelope::parse(value)?;
        let caller_nonce = self.uses_caller_nonce();
        if caller_nonce && nonce.is_none_or(<[u8]>::is_empty) {
            return Err(KeyringError::InvalidInput("invalid convergent nonce supplied".into()));
        }
        let version = self.decryption_version(parsed.version)?;
        let decoded = parsed.decode_payload()?;

        let plaintext = match self.key_type {
            KeyType::Aes256Gcm96 => {
                let key = self.derive_key(context, version)?;
                if decoded.len() < NONCE_SIZE {
                    return Err(InvalidCiphertextReason::ShortNonce.into());
                }

                let (nonce, ciphertext) = match nonce {
                    Some(nonce) if caller_nonce => (nonce, decoded.as_slice()),
                    _ => decoded.split_at(NONCE_SIZE),
                };
                Zeroizing::new(aead::open(&key, nonce, ciphertext)?)
            },
            KeyType::Rsa2048 | KeyType::Rsa4096 => {
                let private = self.key_entry(version)?.rsa_private_key()?;
                Zeroizing::new(
                    private
                        .decrypt(Oaep::new::<Sha256>(), &decoded)
                        .map_err(|_| KeyringError::InvalidCiphertext(InvalidCiphertextReason::DecryptFailed))?,
                )
            },
            other => return Err(KeyringError::unsupported("decryption", other)),
        };

        Ok(STANDARD.encode(plaintext.as_slice()))
    }

    fn ed25519_key(&self, context: &[u8], version: u32) -> Result<ed25519_dalek::SigningKey, KeyringError> {
        if !self.derived {
            return self.key_entry(version)?.ed25519_signing_key();
        }

        let seed = self.derive_key(context, version)?;
        let seed: &[u8; ed25519_dalek::SECRET_KEY_LENGTH] = seed
            .as_slice()
            .try_into()
            .map_err(|_| KeyringError::Internal("derived Ed25519 seed has the wrong length".into()))?;
        Ok(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    fn signature_message<'a>(&self, input: &'a [u8], options: &SignOptions) -> Cow<'a, [u8]> {
        if self.key_type.hash_signature_input() && !options.prehashed {
            Cow::Owned(options.hash.digest(input))
        } else {
            Cow::Borrowed(input)
        }
    }

    /// Sign `input` with `version` (0 = latest).
    ///
    /// ECDSA and RSA sign the digest of `input` unless `options.prehashed`;
    /// Ed25519 always signs `input` itself.
    pub fn sign<E: Environment>(
        &self,
        env: &E,
        version: u32,
        context: &[u8],
        input: &[u8],
        options: &SignOptions,
    ) -> Result<SigningResult, KeyringError> {
        if !self.key_type.signing_supported() {
            return Err(KeyringError::unsupported("signing", self.key_type));
        }

        let version = self.encryption_version(version, "signing")?;
        let message = self.signature_message(input, options);
        let mut public_key = None;

        let signature = match self.key_type {
            KeyType::EcdsaP256 => {
                let key = self.key_entry(version)?.ecdsa_signing_key()?;
                let signature: p256::ecdsa::Signature = key
                    .sign_prehash(&message)
                    .map_err(|e| KeyringError::InvalidInput(format!("unable to sign input: {e}")))?;
                match options.marshaling {
                    Marshaling::Asn1 => signature.to_der().as_bytes().to_vec(),
                    Marshaling::Jws => signature.to_bytes().to_vec(),
                }
            },
            KeyType::Ed25519 => {
                let key = self.ed25519_key(context, version)?;
                if self.derived {
                    public_key = Some(key.verifying_key().to_bytes().to_vec());
                }
                key.sign(input).to_bytes().to_vec()
            },
            KeyType::Rsa2048 | KeyType::Rsa4096 => {
                let key = self.key_entry(version)?.rsa_private_key()?;
                let mut rng = env.rng();
                let signed = match options.rsa_padding {
                    RsaPadding::Pss => key.sign_with_rng(&mut rng, options.hash.pss(), &message),
                    RsaPadding::Pkcs1v15 => key.sign_with_rng(&mut rng, options.hash.pkcs1v15(), &message),
                };
                signed.map_err(|e| KeyringError::Internal(format!("RSA signing failed: {e}")))?
            },
            other => return Err(KeyringError::unsupported("signing", other)),
        };

        let encoded = match options.marshaling {
            Marshaling::Asn1 => STANDARD.encode(&signature),
            Marshaling::Jws => URL_SAFE_NO_PAD.encode(&signature),
        };

        Ok(SigningResult { signature: envelope::render_encoded(version, &encoded), public_key })
    }

    /// Check `signature` over `input`.
    ///
    /// A well-formed envelope carrying a bad signature yields `Ok(false)`;
    /// a malformed envelope or disallowed version is an error.
    pub fn verify_signature(
        &self,
        context: &[u8],
        input: &[u8],
        signature: &str,
        options: &SignOptions,
    ) -> Result<bool, KeyringError> {
        if !self.key_type.signing_supported() {
            return Err(KeyringError::unsupported("signature verification", self.key_type));
        }

        let parsed = Envelope::parse(signature)?;
        let version = self.decryption_version(parsed.version)?;
        let sig_bytes = match options.marshaling {
            Marshaling::Asn1 => parsed.decode_payload()?,
            Marshaling::Jws => URL_SAFE_NO_PAD
                .decode(parsed.payload)
                .map_err(|_| KeyringError::InvalidCiphertext(InvalidCiphertextReason::BadBase64))?,
        };
        let message = self.signature_message(input, options);

        match self.key_type {
            KeyType::EcdsaP256 => {
                let key = self.key_entry(version)?.ecdsa_verifying_key()?;
                let parsed = match options.marshaling {
                    Marshaling::Asn1 => p256::ecdsa::Signature::from_der(&sig_bytes)
                        .ok()
                        // Reject trailing data after the DER sequence
                        .filter(|sig| sig.to_der().as_bytes().len() == sig_bytes.len()),
                    Marshaling::Jws => p256::ecdsa::Signature::from_slice(&sig_bytes).ok(),
                };
                let Some(sig) = parsed else {
                    return Ok(false);
                };
                Ok(key.verify_prehash(&message, &sig).is_ok())
            },
            KeyType::Ed25519 => {
                let public = self.ed25519_key(context, version)?.verifying_key();
                let Ok(sig) = ed25519_dalek::Signature::from_slice(&sig_bytes) else {
                    return Ok(false);
                };
                Ok(public.verify(input, &sig).is_ok())
            },
            KeyType::Rsa2048 | KeyType::Rsa4096 => {
                let public = self.key_entry(version)?.rsa_private_key()?.to_public_key();
                let verified = match options.rsa_padding {
                    RsaPadding::Pss => public.verify(options.hash.pss(), &message, &sig_bytes),
                    RsaPadding::Pkcs1v15 => public.verify(options.hash.pkcs1v15(), &message, &sig_bytes),
                };
                Ok(verified.is_ok())
            },
            other => Err(KeyringError::unsupported("signature verification", other)),
        }
    }

    /// HMAC key of `version`.
    pub fn hmac_key(&self, version: u32) -> Result<&[u8], KeyringError> {
        if version == 0 || version > self.latest_version {
            return Err(KeyringError::InvalidVersion(format!(
                "key version {version} does not exist; latest key version is {}",
                self.latest_version
            )));
        }
        let entry = self.key_entry(version)?;
        if entry.hmac_key.is_empty() {
            return Err(KeyringError::InvalidVersion("no HMAC key exists for that key version".into()));
        }
        Ok(&entry.hmac_key)
    }

    /// HMAC `input` with `version`'s HMAC key (0 = latest).
    pub fn hmac(&self, version: u32, input: &[u8], hash: HashAlgorithm) -> Result<String, KeyringError> {
        let version = self.encryption_version(version, "hmac")?;
        let key = self.hmac_key(version)?;
        Ok(envelope::render(version, &hash.hmac(key, input)))
    }

    /// Check an HMAC envelope produced by [`hmac`](Self::hmac).
    pub fn verify_hmac(&self, input: &[u8], value: &str, hash: HashAlgorithm) -> Result<bool, KeyringError> {
        let parsed = Envelope::parse(value)?;
        let version = self.decryption_version(parsed.version)?;
        let tag = parsed.decode_payload()?;
        let key = self.hmac_key(version)?;
        Ok(hash.verify_hmac(key, input, &tag))
    }

    /// Public keys of every active version.
    pub fn public_keys(&self) -> Result<Vec<PublicKeyInfo>, KeyringError> {
        if !self.key_type.signing_supported() {
            return Err(KeyringError::unsupported("public key listing", self.key_type));
        }
        if self.derived && self.key_type == KeyType::Ed25519 {
            return Err(KeyringError::InvalidInput(
                "public keys of derived Ed25519 policies depend on the context".into(),
            ));
        }

        Ok(self
            .keys
            .iter()
            .map(|(version, entry)| PublicKeyInfo {
                version: *version,
                creation_time: entry.creation_time,
                public_key: entry.formatted_public_key.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use keyring_storage::MemoryStorage;

    use super::*;
    use crate::env::testing::SeededEnv;

    fn policy(key_type: KeyType, env: &SeededEnv) -> Policy {
        let storage = MemoryStorage::new();
        let mut policy = Policy::new("test", key_type);
        policy.rotate(&storage, env).unwrap();
        policy
    }

    fn b64(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    #[test]
    fn aes_encrypt_decrypt_random_nonce() {
        let env = SeededEnv::new(1);
        let policy = policy(KeyType::Aes256Gcm96, &env);

        let ct1 = policy.encrypt(&env, 0, b"", None, &b64(b"hello")).unwrap();
        let ct2 = policy.encrypt(&env, 0, b"", None, &b64(b"hello")).unwrap();
        assert!(ct1.starts_with("vault:v1:"));
        assert_ne!(ct1, ct2);
        assert_eq!(policy.decrypt(b"", None, &ct1).unwrap(), b64(b"hello"));
    }

    #[test]
    fn derived_requires_context() {
        let env = SeededEnv::new(2);
        let mut policy = policy(KeyType::Aes256Gcm96, &env);
        policy.derived = true;

        let err = policy.encrypt(&env, 0, b"", None, &b64(b"x")).unwrap_err();
        assert_eq!(err, KeyringError::MissingContext);

        let ct = policy.encrypt(&env, 0, b"ctx", None, &b64(b"x")).unwrap();
        assert_eq!(policy.decrypt(b"ctx", None, &ct).unwrap(), b64(b"x"));
        assert_eq!(
            policy.decrypt(b"other", None, &ct).unwrap_err(),
            KeyringError::InvalidCiphertext(InvalidCiphertextReason::DecryptFailed)
        );
    }

    #[test]
    fn counter_kdf_differs_from_hkdf() {
        let env = SeededEnv::new(3);
        let mut policy = policy(KeyType::Aes256Gcm96, &env);
        policy.derived = true;

        let hkdf = policy.derive_key(b"ctx", 1).unwrap();
        policy.kdf = KdfMode::HmacSha256Counter;
        let counter = policy.derive_key(b"ctx", 1).unwrap();
        assert_eq!(hkdf.len(), 32);
        assert_eq!(counter.len(), 32);
        assert_ne!(*hkdf, *counter);
    }

    #[test]
    fn derive_key_checks_type_and_version() {
        let env = SeededEnv::new(4);
        let ecdsa = policy(KeyType::EcdsaP256, &env);
        assert_eq!(ecdsa.derive_key(b"c", 1).unwrap_err().code(), "unsupported_key_type_for_operation");

        let aes = policy(KeyType::Aes256Gcm96, &env);
        assert_eq!(aes.derive_key(b"c", 0).unwrap_err().code(), "invalid_version");
        assert_eq!(aes.derive_key(b"c", 2).unwrap_err().code(), "invalid_version");
        assert_eq!(*aes.derive_key(b"", 1).unwrap(), aes.keys[&1].key);
    }

    #[test]
    fn convergent_v1_needs_caller_nonce() {
        let env = SeededEnv::new(5);
        let mut policy = policy(KeyType::Aes256Gcm96, &env);
        policy.derived = true;
        policy.convergent_encryption = true;
        policy.convergent_version = 1;

        let err = policy.encrypt(&env, 0, b"ctx", None, &b64(b"x")).unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let nonce = [9u8; NONCE_SIZE];
        let a = policy.encrypt(&env, 0, b"ctx", Some(&nonce), &b64(b"x")).unwrap();
        let b = policy.encrypt(&env, 0, b"ctx", Some(&nonce), &b64(b"x")).unwrap();
        assert_eq!(a, b);

        // Nonce is not prepended: payload is ciphertext plus tag only
        let raw = Envelope::parse(&a).unwrap().decode_payload().unwrap();
        assert_eq!(raw.len(), 1 + aead::TAG_SIZE);

        assert!(policy.decrypt(b"ctx", None, &a).is_err());
        assert_eq!(policy.decrypt(b"ctx", Some(&nonce), &a).unwrap(), b64(b"x"));
    }

    #[test]
    fn unversioned_convergent_record_round_trips() {
        let env = SeededEnv::new(6);
        let mut policy = policy(KeyType::Aes256Gcm96, &env);
        policy.derived = true;
        policy.convergent_encryption = true;
        policy.convergent_version = 0;

        // Treated as version 1 on both sides
        assert!(policy.encrypt(&env, 0, b"ctx", None, &b64(b"x")).is_err());
        let nonce = [4u8; NONCE_SIZE];
        let ct = policy.encrypt(&env, 0, b"ctx", Some(&nonce), &b64(b"x")).unwrap();
        assert_eq!(policy.decrypt(b"ctx", Some(&nonce), &ct).unwrap(), b64(b"x"));
    }

    #[test]
    fn encrypt_rejects_bad_input() {
        let env = SeededEnv::new(6);
        let policy = policy(KeyType::Aes256Gcm96, &env);

        assert_eq!(policy.encrypt(&env, 0, b"", None, "not base64!").unwrap_err().code(), "invalid_input");
        assert_eq!(policy.encrypt(&env, 5, b"", None, "").unwrap_err().code(), "invalid_version");

        let ecdsa = self::policy(KeyType::EcdsaP256, &env);
        assert_eq!(
            ecdsa.encrypt(&env, 0, b"", None, "").unwrap_err().code(),
            "unsupported_key_type_for_operation"
        );
    }

    #[test]
    fn decrypt_reports_envelope_problems() {
        let env = SeededEnv::new(7);
        let policy = policy(KeyType::Aes256Gcm96, &env);

        let cases = [
            ("garbage", "no_prefix"),
            ("vault:v1", "wrong_fields"),
            ("vault:vX:AAAA", "bad_version"),
            ("vault:v1:@@@", "bad_base64"),
            ("vault:v1:AAAA", "short_nonce"),
        ];
        for (input, reason) in cases {
            match policy.decrypt(b"", None, input) {
                Err(KeyringError::InvalidCiphertext(r)) => assert_eq!(r.code(), reason, "{input}"),
                other => panic!("{input}: unexpected {other:?}"),
            }
        }
        assert_eq!(policy.decrypt(b"", None, "vault:v9:AAAA").unwrap_err().code(), "invalid_version");
    }

    #[test]
    fn min_encryption_version_gates_encrypt_and_sign() {
        let storage = MemoryStorage::new();
        let env = SeededEnv::new(8);
        let mut policy = Policy::new("p", KeyType::Ed25519);
        policy.rotate(&storage, &env).unwrap();
        policy.rotate(&storage, &env).unwrap();
        policy.min_encryption_version = 2;

        let opts = SignOptions::default();
        assert_eq!(policy.sign(&env, 1, b"", b"m", &opts).unwrap_err().code(), "invalid_version");
        let res = policy.sign(&env, 0, b"", b"m", &opts).unwrap();
        assert!(res.signature.starts_with("vault:v2:"));
        assert!(res.public_key.is_none());
    }

    #[test]
    fn ecdsa_jws_and_prehashed() {
        let env = SeededEnv::new(9);
        let policy = policy(KeyType::EcdsaP256, &env);

        let jws = SignOptions { marshaling: Marshaling::Jws, ..SignOptions::default() };
        let sig = policy.sign(&env, 0, b"", b"payload", &jws).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(sig.signature.trim_start_matches("vault:v1:")).unwrap();
        assert_eq!(raw.len(), 64);
        assert!(policy.verify_signature(b"", b"payload", &sig.signature, &jws).unwrap());

        let digest = HashAlgorithm::Sha2_256.digest(b"payload");
        let pre = SignOptions { prehashed: true, ..SignOptions::default() };
        let sig = policy.sign(&env, 0, b"", &digest, &pre).unwrap();
        assert!(policy.verify_signature(b"", b"payload", &sig.signature, &SignOptions::default()).unwrap());
    }

    #[test]
    fn ecdsa_rejects_trailing_der_data() {
        let env = SeededEnv::new(10);
        let policy = policy(KeyType::EcdsaP256, &env);
        let opts = SignOptions::default();

        let sig = policy.sign(&env, 0, b"", b"m", &opts).unwrap();
        let mut raw = Envelope::parse(&sig.signature).unwrap().decode_payload().unwrap();
        raw.push(0);
        let padded = envelope::render(1, &raw);
        assert!(!policy.verify_signature(b"", b"m", &padded, &opts).unwrap());
    }

    #[test]
    fn derived_ed25519_returns_public_key() {
        let env = SeededEnv::new(11);
        let mut policy = policy(KeyType::Ed25519, &env);
        policy.derived = true;
        let opts = SignOptions::default();

        let a = policy.sign(&env, 0, b"ctx-a", b"m", &opts).unwrap();
        let b = policy.sign(&env, 0, b"ctx-b", b"m", &opts).unwrap();
        assert_eq!(a.public_key.as_ref().map(Vec::len), Some(32));
        assert_ne!(a.public_key, b.public_key);

        assert!(policy.verify_signature(b"ctx-a", b"m", &a.signature, &opts).unwrap());
        assert!(!policy.verify_signature(b"ctx-b", b"m", &a.signature, &opts).unwrap());
        assert!(policy.public_keys().is_err());
    }

    #[test]
    fn hmac_roundtrip_and_version_gate() {
        let storage = MemoryStorage::new();
        let env = SeededEnv::new(12);
        let mut policy = Policy::new("p", KeyType::Aes256Gcm96);
        policy.rotate(&storage, &env).unwrap();
        policy.rotate(&storage, &env).unwrap();

        let tag = policy.hmac(1, b"data", HashAlgorithm::Sha2_256).unwrap();
        assert!(tag.starts_with("vault:v1:"));
        assert!(policy.verify_hmac(b"data", &tag, HashAlgorithm::Sha2_256).unwrap());
        assert!(!policy.verify_hmac(b"other", &tag, HashAlgorithm::Sha2_256).unwrap());
        assert!(!policy.verify_hmac(b"data", &tag, HashAlgorithm::Sha2_512).unwrap());

        policy.min_decryption_version = 2;
        assert_eq!(policy.verify_hmac(b"data", &tag, HashAlgorithm::Sha2_256).unwrap_err(), KeyringError::TooOld);
        assert_eq!(policy.hmac_key(0).unwrap_err().code(), "invalid_version");
        assert_eq!(policy.hmac_key(2).unwrap().len(), 32);
    }

    #[test]
    fn public_keys_lists_active_versions() {
        let storage = MemoryStorage::new();
        let env = SeededEnv::new(13);
        let mut policy = Policy::new("p", KeyType::EcdsaP256);
        policy.rotate(&storage, &env).unwrap();
        policy.rotate(&storage, &env).unwrap();

        let keys = policy.public_keys().unwrap();
        assert_eq!(keys.iter().map(|k| k.version).collect::<Vec<_>>(), vec![1, 2]);
        assert!(keys.iter().all(|k| k.public_key.contains("PUBLIC KEY")));

        let aes = self::policy(KeyType::Aes256Gcm96, &env);
        assert!(aes.public_keys().is_err());
    }
}
