//! The versioned keyring record and its lifecycle: rotation, persistence
//! with archiving, and first-load upgrade.

use std::collections::BTreeMap;

use keyring_storage::{Storage, StorageEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Environment, KdfMode, KeyEntry, KeyType, KeyringError, VersionStamp,
    archive::{load_archive, store_archive},
    encoding::base64_bytes,
    key_entry::HMAC_KEY_SIZE,
};

/// Storage prefix for policy records.
pub const POLICY_PREFIX: &str = "policy/";

/// Storage path of the policy record for `name`.
pub fn policy_path(name: &str) -> String {
    format!("{POLICY_PREFIX}{name}")
}

/// A named, versioned keyring.
///
/// Not internally synchronized: the [`LockManager`](crate::LockManager)
/// hands it out behind a per-name read or write lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique name within the storage namespace
    pub name: String,

    /// Pre-versioning key material; lifted into `keys[1]` on upgrade
    #[serde(with = "base64_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub key: Vec<u8>,

    /// Active key versions
    #[serde(default)]
    pub keys: BTreeMap<u32, KeyEntry>,

    /// Operations require a context and use a per-context derived key
    #[serde(default)]
    pub derived: bool,

    /// KDF used when `derived` is set
    #[serde(default)]
    pub kdf: KdfMode,

    /// Identical plaintext and context encrypt to identical ciphertext
    #[serde(default)]
    pub convergent_encryption: bool,

    /// Key material may be exported
    #[serde(default)]
    pub exportable: bool,

    /// Lowest version accepted for decryption and verification
    #[serde(default)]
    pub min_decryption_version: u32,

    /// Lowest version usable for encryption and signing; 0 means unset
    #[serde(default)]
    pub min_encryption_version: u32,

    /// Newest version
    #[serde(default)]
    pub latest_version: u32,

    /// Newest version copied into the archive
    #[serde(default)]
    pub archive_version: u32,

    /// The policy may be deleted
    #[serde(default)]
    pub deletion_allowed: bool,

    /// Convergent nonce schema: 1 = caller nonce, 2+ = HMAC(context, plaintext)
    #[serde(default)]
    pub convergent_version: u32,

    /// Plaintext backups may be taken; requires `exportable`
    #[serde(default)]
    pub allow_plaintext_backup: bool,

    /// Most recent backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_info: Option<VersionStamp>,

    /// Backup this record was restored from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_info: Option<VersionStamp>,

    /// Algorithm of every version
    #[serde(rename = "type")]
    pub key_type: KeyType,
}

/// Changes applied by [`Policy::update_config`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyConfigUpdate {
    /// New minimum decryption version; 0 is raised to 1
    pub min_decryption_version: Option<u32>,
    /// New minimum encryption version; 0 clears it
    pub min_encryption_version: Option<u32>,
    /// Allow or forbid deletion
    pub deletion_allowed: Option<bool>,
    /// Mark exportable; cannot be turned off again
    pub exportable: Option<bool>,
    /// Permit plaintext backups; cannot be turned off again
    pub allow_plaintext_backup: Option<bool>,
}

impl Policy {
    /// Empty policy with no key versions and HKDF derivation.
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key: Vec::new(),
            keys: BTreeMap::new(),
            derived: false,
            kdf: KdfMode::default(),
            convergent_encryption: false,
            exportable: false,
            min_decryption_version: 0,
            min_encryption_version: 0,
            latest_version: 0,
            archive_version: 0,
            deletion_allowed: false,
            convergent_version: 0,
            allow_plaintext_backup: false,
            backup_info: None,
            restore_info: None,
            key_type,
        }
    }

    /// Storage path of this policy's record.
    pub fn storage_path(&self) -> String {
        policy_path(&self.name)
    }

    /// Whether convergent encryption takes its nonce from the caller.
    ///
    /// Records from before nonce schemas were versioned count as version 1.
    pub(crate) fn uses_caller_nonce(&self) -> bool {
        self.convergent_encryption && self.convergent_version.max(1) == 1
    }

    /// JSON record as written to storage.
    pub fn serialize(&self) -> Result<Vec<u8>, KeyringError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a stored JSON record.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, KeyringError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Check the structural invariants that hold after every successful
    /// persist.
    pub fn check_invariants(&self) -> Result<(), KeyringError> {
        self.check_versions()?;

        for version in self.min_decryption_version..=self.latest_version {
            match self.keys.get(&version) {
                Some(entry) if entry.hmac_key.len() == HMAC_KEY_SIZE => {},
                Some(_) => return Err(missing_hmac_key(version)),
                None => {
                    return Err(KeyringError::InvariantViolation(format!(
                        "version {version} missing from active keys"
                    )));
                },
            }
        }
        Ok(())
    }

    /// Version counters and convergence settings, independent of the key map.
    fn check_versions(&self) -> Result<(), KeyringError> {
        let violation = |msg: String| Err(KeyringError::InvariantViolation(msg));

        if self.min_decryption_version < 1 {
            return violation(format!(
                "minimum decryption version of {} is less than 1",
                self.min_decryption_version
            ));
        }
        if self.latest_version < 1 {
            return violation(format!("latest version of {} is less than 1", self.latest_version));
        }
        if self.archive_version > self.latest_version {
            return violation(format!(
                "archive version of {} is greater than the latest version {}",
                self.archive_version, self.latest_version
            ));
        }
        if self.min_encryption_version > 0 && self.min_encryption_version < self.min_decryption_version
        {
            return violation(format!(
                "minimum decryption version of {} is greater than minimum encryption version {}",
                self.min_decryption_version, self.min_encryption_version
            ));
        }
        if self.min_decryption_version > self.latest_version {
            return violation(format!(
                "minimum decryption version of {} is greater than the latest version {}",
                self.min_decryption_version, self.latest_version
            ));
        }
        if self.convergent_encryption && self.convergent_version < 1 {
            return violation("convergent encryption requires a convergent version".into());
        }
        Ok(())
    }

    /// Sync the archive with the active key map.
    ///
    /// If the active map lacks `min_decryption_version` (it was lowered), the
    /// missing versions are copied back from the archive. Otherwise every
    /// version newer than `archive_version` is written to the archive and,
    /// only after that write succeeds, versions below
    /// `min_decryption_version` are dropped from the active map.
    fn handle_archiving<S: Storage>(&mut self, storage: &S) -> Result<(), KeyringError> {
        let keys_contains_minimum = self.keys.contains_key(&self.min_decryption_version);

        self.check_versions()?;
        if !keys_contains_minimum && self.archive_version != self.latest_version {
            return Err(KeyringError::InvariantViolation(
                "need to move keys from archive but archive version not up-to-date".into(),
            ));
        }
        // Nothing reaches the archive without an HMAC key
        if let Some((version, _)) = self
            .keys
            .range(self.min_decryption_version..)
            .find(|(_, entry)| entry.hmac_key.len() != HMAC_KEY_SIZE)
        {
            return Err(missing_hmac_key(*version));
        }

        let mut archive = load_archive(storage, &self.name)?;

        if !keys_contains_minimum {
            let mut restored = BTreeMap::new();
            for version in self.min_decryption_version..=self.latest_version {
                let entry = archive.get(version).cloned().ok_or_else(|| {
                    KeyringError::InvariantViolation(format!("archive is missing version {version}"))
                })?;
                restored.insert(version, entry);
            }
            debug!(policy = %self.name, restored = restored.len(), "restored keys from archive");
            self.keys.extend(restored);
            return Ok(());
        }

        let slots = self.latest_version as usize + 1;
        if archive.keys.len() < slots {
            archive.keys.resize_with(slots, KeyEntry::default);
        }

        for version in self.archive_version + 1..=self.latest_version {
            let entry = self.keys.get(&version).cloned().ok_or_else(|| {
                KeyringError::InvariantViolation(format!("active keys are missing version {version}"))
            })?;
            archive.keys[version as usize] = entry;
        }

        store_archive(storage, &self.name, &archive)?;
        debug!(
            policy = %self.name,
            from = self.archive_version,
            to = self.latest_version,
            "archive updated"
        );
        self.archive_version = self.latest_version;

        let min = self.min_decryption_version;
        self.keys.retain(|version, _| *version >= min);
        Ok(())
    }

    /// Archive, then write the policy record.
    ///
    /// On failure the active key map and `archive_version` are restored.
    pub fn persist<S: Storage>(&mut self, storage: &S) -> Result<(), KeyringError> {
        let prior_archive_version = self.archive_version;
        let prior_keys = self.keys.clone();

        let result = self
            .handle_archiving(storage)
            .and_then(|()| self.check_invariants())
            .and_then(|()| self.write(storage));
        if let Err(err) = &result {
            warn!(policy = %self.name, error = %err, "persist failed, state rolled back");
            self.archive_version = prior_archive_version;
            self.keys = prior_keys;
        }
        result
    }

    fn write<S: Storage>(&self, storage: &S) -> Result<(), KeyringError> {
        storage.put(&StorageEntry::new(self.storage_path(), self.serialize()?))?;
        Ok(())
    }

    /// Add a new key version and persist.
    ///
    /// On failure the policy is left exactly as it was.
    pub fn rotate<S: Storage, E: Environment>(
        &mut self,
        storage: &S,
        env: &E,
    ) -> Result<(), KeyringError> {
        let prior = self.clone();

        let result = self.rotate_inner(storage, env);
        match &result {
            Ok(()) => info!(policy = %self.name, version = self.latest_version, "policy rotated"),
            Err(err) => {
                warn!(policy = %self.name, error = %err, "rotation failed, state rolled back");
                *self = prior;
            },
        }
        result
    }

    fn rotate_inner<S: Storage, E: Environment>(
        &mut self,
        storage: &S,
        env: &E,
    ) -> Result<(), KeyringError> {
        let entry = KeyEntry::generate(self.key_type, env)?;

        self.latest_version += 1;
        self.keys.insert(self.latest_version, entry);

        // Versions start at 1
        if self.min_decryption_version == 0 {
            self.min_decryption_version = 1;
        }

        self.persist(storage)
    }

    /// Whether this record predates the current layout.
    pub fn needs_upgrade(&self) -> bool {
        if !self.key.is_empty() {
            return true;
        }
        if self.latest_version == 0 && !self.keys.is_empty() {
            return true;
        }
        if self.min_decryption_version == 0 || self.archive_version == 0 {
            return true;
        }
        if self.convergent_encryption && self.convergent_version == 0 {
            return true;
        }
        self.keys.values().any(|entry| entry.hmac_key.is_empty())
    }

    /// Bring an old record up to date and persist it once if anything
    /// changed. Running it twice is a no-op the second time.
    pub fn upgrade<S: Storage, E: Environment>(
        &mut self,
        storage: &S,
        env: &E,
    ) -> Result<(), KeyringError> {
        let prior = self.clone();

        let result = self.upgrade_inner(storage, env);
        if let Err(err) = &result {
            warn!(policy = %self.name, error = %err, "upgrade failed, state rolled back");
            *self = prior;
        }
        result
    }

    fn upgrade_inner<S: Storage, E: Environment>(
        &mut self,
        storage: &S,
        env: &E,
    ) -> Result<(), KeyringError> {
        let mut persist_needed = false;

        if !self.key.is_empty() {
            self.migrate_key_to_keys_map(env);
            persist_needed = true;
        }

        if self.latest_version == 0 && !self.keys.is_empty() {
            self.latest_version = self.keys.len() as u32;
            persist_needed = true;
        }

        if self.min_decryption_version == 0 {
            self.min_decryption_version = 1;
            persist_needed = true;
        }

        // First load after archiving was introduced
        if self.archive_version == 0 {
            persist_needed = true;
        }

        if self.convergent_encryption && self.convergent_version == 0 {
            self.convergent_version = 1;
            persist_needed = true;
        }

        for entry in self.keys.values_mut() {
            if entry.hmac_key.is_empty() {
                entry.hmac_key = vec![0u8; HMAC_KEY_SIZE];
                env.random_bytes(&mut entry.hmac_key);
                persist_needed = true;
            }
        }

        if persist_needed {
            self.persist(storage)?;
            info!(policy = %self.name, latest = self.latest_version, "policy upgraded");
        }
        Ok(())
    }

    fn migrate_key_to_keys_map(&mut self, env: &impl Environment) {
        let mut entry = KeyEntry::stamped(env.now());
        entry.key = std::mem::take(&mut self.key);
        self.keys = BTreeMap::from([(1, entry)]);
    }

    /// Apply configuration changes and persist if anything changed.
    ///
    /// Returns whether the policy was written. On error nothing changes.
    pub fn update_config<S: Storage>(
        &mut self,
        update: &PolicyConfigUpdate,
        storage: &S,
    ) -> Result<bool, KeyringError> {
        let prior = self.clone();

        let result = self.update_config_inner(update, storage);
        if result.is_err() {
            *self = prior;
        }
        result
    }

    fn update_config_inner<S: Storage>(
        &mut self,
        update: &PolicyConfigUpdate,
        storage: &S,
    ) -> Result<bool, KeyringError> {
        let invalid = |msg: String| Err(KeyringError::InvalidPolicyConfig(msg));
        let mut persist_needed = false;

        if let Some(min) = update.min_decryption_version {
            // Versions start at 1
            let min = min.max(1);
            if min != self.min_decryption_version {
                if min > self.latest_version {
                    return invalid(format!(
                        "cannot set min decryption version of {min}, latest key version is {}",
                        self.latest_version
                    ));
                }
                self.min_decryption_version = min;
                persist_needed = true;
            }
        }

        if let Some(min) = update.min_encryption_version {
            if min != self.min_encryption_version {
                if min > self.latest_version {
                    return invalid(format!(
                        "cannot set min encryption version of {min}, latest key version is {}",
                        self.latest_version
                    ));
                }
                self.min_encryption_version = min;
                persist_needed = true;
            }
        }

        if self.min_encryption_version > 0 && self.min_encryption_version < self.min_decryption_version
        {
            return invalid(format!(
                "min encryption version of {} must be greater than or equal to min decryption version of {}",
                self.min_encryption_version, self.min_decryption_version
            ));
        }

        if let Some(allowed) = update.deletion_allowed {
            if allowed != self.deletion_allowed {
                self.deletion_allowed = allowed;
                persist_needed = true;
            }
        }

        if let Some(exportable) = update.exportable {
            if self.exportable && !exportable {
                return invalid("exportable keys cannot be made non-exportable".into());
            }
            if exportable && !self.exportable {
                self.exportable = true;
                persist_needed = true;
            }
        }

        if let Some(allow) = update.allow_plaintext_backup {
            if self.allow_plaintext_backup && !allow {
                return invalid("plaintext backups cannot be disallowed once allowed".into());
            }
            if allow && !self.allow_plaintext_backup {
                self.allow_plaintext_backup = true;
                persist_needed = true;
            }
        }

        if persist_needed {
            self.persist(storage)?;
            info!(policy = %self.name, "policy configuration updated");
        }
        Ok(persist_needed)
    }
}

fn missing_hmac_key(version: u32) -> KeyringError {
    KeyringError::InvariantViolation(format!("version {version} has no HMAC key"))
}

/// Read a policy record straight from storage, without locking or upgrading.
pub fn load_policy<S: Storage>(storage: &S, name: &str) -> Result<Option<Policy>, KeyringError> {
    match storage.get(&policy_path(name))? {
        Some(entry) => Ok(Some(Policy::deserialize(&entry.value)?)),
        None => Ok(None),
    }
}
