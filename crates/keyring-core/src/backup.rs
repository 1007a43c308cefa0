//! Plaintext policy backups.
//!
//! A backup is base64 of the JSON record
//! `{"policy": <Policy>, "archived_keys": <ArchivedKeys>}`. It carries every
//! key version ever created, so only policies that are both exportable and
//! explicitly marked `allow_plaintext_backup` can produce one.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use keyring_storage::Storage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{ArchivedKeys, Environment, KeyringError, Policy, load_archive};

/// When a backup or restore happened and the latest version at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Wall-clock time of the operation
    pub time: DateTime<Utc>,
    /// `latest_version` when the operation ran
    pub version: u32,
}

/// Decoded backup: the policy record plus its full archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBackup {
    /// Policy record as of the backup
    pub policy: Policy,
    /// Every key version, including ones trimmed from `policy.keys`
    pub archived_keys: ArchivedKeys,
}

impl PolicyBackup {
    /// Render as base64 JSON.
    pub fn encode(&self) -> Result<String, KeyringError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Parse base64 JSON produced by [`encode`](Self::encode).
    pub fn decode(backup: &str) -> Result<Self, KeyringError> {
        let raw = STANDARD
            .decode(backup.trim())
            .map_err(|e| KeyringError::InvalidInput(format!("backup is not valid base64: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| KeyringError::InvalidInput(format!("backup is not a policy record: {e}")))
    }
}

impl Policy {
    /// Record a backup in the policy, persist, and return the encoded
    /// backup of the persisted state.
    ///
    /// On failure `backup_info` keeps its prior value.
    pub fn backup<S: Storage, E: Environment>(
        &mut self,
        storage: &S,
        env: &E,
    ) -> Result<String, KeyringError> {
        if !self.exportable {
            return Err(KeyringError::BackupNotAllowed("exporting is disallowed on the policy"));
        }
        if !self.allow_plaintext_backup {
            return Err(KeyringError::BackupNotAllowed("plaintext backup is disallowed on the policy"));
        }

        let prior = self.backup_info;
        self.backup_info = Some(VersionStamp { time: env.now(), version: self.latest_version });

        let result = self.persist(storage).and_then(|()| {
            // Persisting may have moved versions into the archive
            let archived_keys = load_archive(storage, &self.name)?;
            PolicyBackup { policy: self.clone(), archived_keys }.encode()
        });
        match &result {
            Ok(_) => info!(policy = %self.name, version = self.latest_version, "policy backed up"),
            Err(err) => {
                warn!(policy = %self.name, error = %err, "backup failed");
                self.backup_info = prior;
            },
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use keyring_storage::MemoryStorage;

    use super::*;
    use crate::{KeyType, env::testing::SeededEnv};

    fn backupable(storage: &MemoryStorage, env: &SeededEnv) -> Policy {
        let mut policy = Policy::new("p", KeyType::Aes256Gcm96);
        policy.exportable = true;
        policy.allow_plaintext_backup = true;
        policy.rotate(storage, env).unwrap();
        policy.rotate(storage, env).unwrap();
        policy
    }

    #[test]
    fn backup_requires_both_flags() {
        let storage = MemoryStorage::new();
        let env = SeededEnv::new(1);
        let mut policy = backupable(&storage, &env);

        policy.allow_plaintext_backup = false;
        assert_eq!(policy.backup(&storage, &env).unwrap_err().code(), "backup_not_allowed");
        policy.allow_plaintext_backup = true;
        policy.exportable = false;
        assert_eq!(policy.backup(&storage, &env).unwrap_err().code(), "backup_not_allowed");
        assert!(policy.backup_info.is_none());
    }

    #[test]
    fn backup_carries_trimmed_versions() {
        let storage = MemoryStorage::new();
        let env = SeededEnv::new(2);
        let mut policy = backupable(&storage, &env);
        policy.min_decryption_version = 2;
        policy.persist(&storage).unwrap();
        assert!(!policy.keys.contains_key(&1));

        let backup = PolicyBackup::decode(&policy.backup(&storage, &env).unwrap()).unwrap();
        assert_eq!(backup.policy, policy);
        assert_eq!(backup.archived_keys.latest_slot(), 2);
        assert!(backup.archived_keys.get(1).is_some());

        let stamp = policy.backup_info.unwrap();
        assert_eq!(stamp.version, 2);
        assert_eq!(stamp.time, env.now());
        assert_eq!(crate::load_policy(&storage, "p").unwrap().unwrap().backup_info, Some(stamp));
    }

    #[test]
    fn failed_backup_keeps_prior_stamp() {
        let storage = MemoryStorage::new();
        let env = SeededEnv::new(3);
        let mut policy = backupable(&storage, &env);

        storage.fail_put(true);
        assert_eq!(policy.backup(&storage, &env).unwrap_err().code(), "storage");
        assert!(policy.backup_info.is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(PolicyBackup::decode("not base64!").unwrap_err().code(), "invalid_input");
        let not_json = STANDARD.encode(b"[1, 2]");
        assert_eq!(PolicyBackup::decode(&not_json).unwrap_err().code(), "invalid_input");
    }
}
