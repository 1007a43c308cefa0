//! The encrypting storage wrapper.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use keyring_core::{CancelToken, Policy, SystemEnv};
use keyring_crypto::base62;
use keyring_storage::{CancellableStorage, Storage, StorageEntry};
use tracing::{debug, warn};

use crate::{DEFAULT_CACHE_SIZE, EksError, TwoQueueCache, path};

/// Default storage prefix for encrypted entries.
pub const DEFAULT_PREFIX: &str = "encryptedkeys/";

/// Encrypted key storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EksConfig {
    /// Storage prefix every encrypted path lives under
    pub prefix: String,
    /// Decoded-name cache capacity; 0 selects the default
    pub cache_size: usize,
}

impl Default for EksConfig {
    fn default() -> Self {
        Self { prefix: DEFAULT_PREFIX.to_string(), cache_size: DEFAULT_CACHE_SIZE }
    }
}

/// Builder for [`EncryptedKeyStorage`].
pub struct EncryptedKeyStorageBuilder<S: Storage> {
    storage: Option<S>,
    policy: Option<Arc<Policy>>,
    config: EksConfig,
}

impl<S: Storage> Default for EncryptedKeyStorageBuilder<S> {
    fn default() -> Self {
        Self { storage: None, policy: None, config: EksConfig::default() }
    }
}

impl<S: Storage> EncryptedKeyStorageBuilder<S> {
    /// Backing storage for the encrypted entries.
    #[must_use]
    pub fn storage(mut self, storage: S) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Policy used to encrypt path segments.
    #[must_use]
    pub fn policy(mut self, policy: Arc<Policy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EksConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage prefix; a trailing `/` is added if missing.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Decoded-name cache capacity.
    #[must_use]
    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.config.cache_size = cache_size;
        self
    }

    /// Validate the policy and build the storage.
    pub fn build(self) -> Result<EncryptedKeyStorage<S>, EksError> {
        let storage = self.storage.ok_or(EksError::NilStorage)?;
        let policy = self.policy.ok_or(EksError::NilPolicy)?;

        if !policy.derived {
            return Err(EksError::PolicyDerivedRequired);
        }
        if !policy.convergent_encryption {
            return Err(EksError::PolicyConvergentRequired);
        }
        if policy.convergent_version < 2 {
            return Err(EksError::PolicyConvergentVersionRequired);
        }

        let mut prefix = self.config.prefix;
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let cache_size =
            if self.config.cache_size == 0 { DEFAULT_CACHE_SIZE } else { self.config.cache_size };

        debug!(policy = %policy.name, prefix = %prefix, cache_size, "encrypted key storage ready");
        Ok(EncryptedKeyStorage { storage, policy, prefix, cache: TwoQueueCache::new(cache_size) })
    }
}

/// Storage wrapper whose paths are encrypted segment by segment.
///
/// Each segment is encrypted convergently under a context made of the
/// prefix and the plaintext segments above it, then rendered in base62.
/// The same logical path always maps to the same stored path, sibling
/// names stay siblings, and a segment's ciphertext depends on its parents.
///
/// ```text
/// a/b/c  ──►  prefix/E("prefix", a)/E("prefix/a", b)/E("prefix/a/b", c)
/// ```
///
/// Values are stored as given; only paths are encrypted.
pub struct EncryptedKeyStorage<S: Storage> {
    storage: S,
    policy: Arc<Policy>,
    prefix: String,
    cache: TwoQueueCache<String, String>,
}

impl<S: Storage> Clone for EncryptedKeyStorage<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            policy: Arc::clone(&self.policy),
            prefix: self.prefix.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<S: Storage> EncryptedKeyStorage<S> {
    /// Start building a new instance.
    pub fn builder() -> EncryptedKeyStorageBuilder<S> {
        EncryptedKeyStorageBuilder::default()
    }

    /// Build from parts; see [`EncryptedKeyStorageBuilder::build`].
    pub fn new(storage: S, policy: Arc<Policy>, config: EksConfig) -> Result<Self, EksError> {
        Self::builder().storage(storage).policy(policy).config(config).build()
    }

    /// Storage prefix, always ending in `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Policy encrypting the paths.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// View of this storage whose backend calls fail once `token` is
    /// cancelled. The view shares this instance's cache.
    pub fn with_cancel(&self, token: &CancelToken) -> EncryptedKeyStorage<CancellableStorage<S>> {
        EncryptedKeyStorage {
            storage: CancellableStorage::new(self.storage.clone(), token.clone()),
            policy: Arc::clone(&self.policy),
            prefix: self.prefix.clone(),
            cache: self.cache.clone(),
        }
    }

    /// Stored path for the logical `path`. The root (`""`, `"/"`) maps to
    /// the prefix itself.
    pub fn encrypt_path(&self, path: &str) -> Result<String, EksError> {
        let root = self.prefix.trim_end_matches('/');
        let cleaned = path::clean(path);
        let relative = cleaned.trim_start_matches('/');
        if relative.is_empty() || relative == "." {
            return Ok(root.to_string());
        }

        let mut encrypted = root.to_string();
        let mut context = root.to_string();
        for segment in relative.split('/') {
            // Convergent v2 derives its nonce from the input; no randomness is drawn
            let ciphertext =
                self.policy.encrypt(&SystemEnv, 0, context.as_bytes(), None, &STANDARD.encode(segment))?;
            encrypted.push('/');
            encrypted.push_str(&base62::encode(ciphertext.as_bytes()));
            context = path::join(&context, segment);
        }
        Ok(encrypted)
    }

    /// Plaintext names directly under the logical `prefix`, sorted
    /// ascending. Directories carry a trailing `/`.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>, EksError> {
        let encrypted_prefix = self.encrypt_path(prefix)?;
        let children = self.storage.list(&format!("{encrypted_prefix}/"))?;
        let context = path::join(&self.prefix, prefix);

        let mut names = children
            .iter()
            .map(|child| self.decrypt_name(child, &context))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }

    fn decrypt_name(&self, child: &str, context: &str) -> Result<String, EksError> {
        if let Some(name) = self.cache.get(&child.to_string()) {
            return Ok(name);
        }

        let (encoded, is_dir) = match child.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (child, false),
        };

        let decode_failed = |reason: String| {
            warn!(name = child, reason = %reason, "could not decode listed name");
            EksError::DecodeFailed(reason)
        };

        let raw = base62::decode(encoded).map_err(|e| decode_failed(e.to_string()))?;
        if raw.is_empty() {
            return Err(decode_failed("empty name".into()));
        }
        let ciphertext = String::from_utf8(raw).map_err(|e| decode_failed(e.to_string()))?;
        let plaintext = self.policy.decrypt(context.as_bytes(), None, &ciphertext)?;
        let bytes = STANDARD.decode(plaintext).map_err(|e| decode_failed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(decode_failed("name decrypted to nothing".into()));
        }
        let mut name = String::from_utf8(bytes).map_err(|e| decode_failed(e.to_string()))?;

        if is_dir {
            name.push('/');
        }
        self.cache.insert(child.to_string(), name.clone());
        Ok(name)
    }

    /// Entry at the logical `key`, returned under that logical key.
    pub fn get(&self, key: &str) -> Result<Option<StorageEntry>, EksError> {
        let path = self.encrypt_path(key)?;
        Ok(self.storage.get(&path)?.map(|entry| StorageEntry::new(key, entry.value)))
    }

    /// Store `entry` under its encrypted path. `entry` itself is not
    /// modified.
    pub fn put(&self, entry: &StorageEntry) -> Result<(), EksError> {
        let path = self.encrypt_path(&entry.key)?;
        self.storage.put(&StorageEntry::new(path, entry.value.clone()))?;
        Ok(())
    }

    /// Remove the entry at the logical `key`.
    pub fn delete(&self, key: &str) -> Result<(), EksError> {
        let path = self.encrypt_path(key)?;
        self.storage.delete(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use keyring_core::KeyType;
    use keyring_storage::MemoryStorage;

    use super::*;

    fn policy(derived: bool, convergent: bool, version: u32) -> Arc<Policy> {
        let mut policy = Policy::new("eks", KeyType::Aes256Gcm96);
        policy.derived = derived;
        policy.convergent_encryption = convergent;
        policy.convergent_version = version;
        policy.rotate(&MemoryStorage::new(), &SystemEnv::new()).unwrap();
        Arc::new(policy)
    }

    fn eks() -> EncryptedKeyStorage<MemoryStorage> {
        EncryptedKeyStorage::builder()
            .storage(MemoryStorage::new())
            .policy(policy(true, true, 2))
            .prefix("prefix")
            .build()
            .unwrap()
    }

    #[test]
    fn missing_parts_are_rejected() {
        let err = EncryptedKeyStorage::<MemoryStorage>::builder().policy(policy(true, true, 2)).build();
        assert_eq!(err.err().map(|e| e.code()), Some("nil_storage"));

        let err = EncryptedKeyStorage::builder().storage(MemoryStorage::new()).build();
        assert_eq!(err.err().map(|e| e.code()), Some("nil_policy"));
    }

    #[test]
    fn prefix_gains_trailing_slash() {
        assert_eq!(eks().prefix(), "prefix/");
    }

    #[test]
    fn root_maps_to_prefix() {
        let eks = eks();
        assert_eq!(eks.encrypt_path("").unwrap(), "prefix");
        assert_eq!(eks.encrypt_path("/").unwrap(), "prefix");
        assert_eq!(eks.encrypt_path("a/..").unwrap(), "prefix");
    }

    #[test]
    fn equivalent_spellings_share_a_path() {
        let eks = eks();
        let canonical = eks.encrypt_path("a/b").unwrap();
        for spelling in ["/a/b", "a//b", "a/./b/", "a/c/../b"] {
            assert_eq!(eks.encrypt_path(spelling).unwrap(), canonical, "{spelling}");
        }
    }

    #[test]
    fn same_leaf_under_different_parents_differs() {
        let eks = eks();
        let a = eks.encrypt_path("x/leaf").unwrap();
        let b = eks.encrypt_path("y/leaf").unwrap();
        let leaf_a = a.rsplit('/').next().unwrap();
        let leaf_b = b.rsplit('/').next().unwrap();
        assert_ne!(leaf_a, leaf_b);
    }

    #[test]
    fn paths_hide_plaintext() {
        let eks = eks();
        let path = eks.encrypt_path("secret-name/other").unwrap();
        assert!(path.starts_with("prefix/"));
        assert!(path.split('/').all(|segment| segment != "secret-name" && segment != "other"));
        assert!(path.trim_start_matches("prefix/").chars().all(|c| c.is_ascii_alphanumeric() || c == '/'));
    }

    #[test]
    fn listing_populates_cache() {
        let eks = eks();
        eks.put(&StorageEntry::new("dir/a", b"1".to_vec())).unwrap();
        assert!(eks.cache.is_empty());

        assert_eq!(eks.list("dir").unwrap(), vec!["a"]);
        assert_eq!(eks.cache.len(), 1);
        assert_eq!(eks.list("dir/").unwrap(), vec!["a"]);
    }

    #[test]
    fn undecodable_listing_fails() {
        let memory = MemoryStorage::new();
        let eks = EncryptedKeyStorage::builder()
            .storage(memory.clone())
            .policy(policy(true, true, 2))
            .build()
            .unwrap();
        memory.put(&StorageEntry::new("encryptedkeys/0", b"x".to_vec())).unwrap();

        assert_eq!(eks.list("").unwrap_err().code(), "decode_failed");
    }

    #[test]
    fn cancelled_view_refuses_storage() {
        let eks = eks();
        let token = CancelToken::new();
        let view = eks.with_cancel(&token);
        view.put(&StorageEntry::new("k", b"v".to_vec())).unwrap();

        token.cancel();
        assert_eq!(view.get("k").unwrap_err().code(), "storage");
        assert!(eks.get("k").unwrap().is_some());
        // Path encryption needs no storage
        assert!(view.encrypt_path("k").is_ok());
    }
}
