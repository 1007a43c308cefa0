//! Per-policy locking and the policy cache.
//!
//! Every policy name maps to its own `RwLock`, so callers working on
//! unrelated policies never contend. The lock table and the cache are each
//! behind a short-held mutex and neither is held while waiting on a policy
//! lock:
//!
//! ```text
//! locks.lock() ── clone Arc<RwLock> ── unlock ──► name lock ──► cache.lock()
//! ```
//!
//! Handles returned to callers are RAII guards. A shared handle always
//! carries a read lock, even when loading the policy required an upgrade
//! under the write lock first.

use std::{collections::HashMap, ops::Deref, ops::DerefMut, sync::Arc};

use keyring_storage::{CancelToken, CancellableStorage, Storage};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use tracing::{debug, info, warn};

use crate::{
    Environment, KdfMode, KeyType, KeyringError, Policy, PolicyBackup, PolicyConfigUpdate,
    VersionStamp,
    archive::{archive_path, store_archive},
    load_policy, policy_path,
};

/// Lock manager settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockManagerConfig {
    /// Keep loaded policies in memory between calls
    pub cache_enabled: bool,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self { cache_enabled: true }
    }
}

/// Parameters for [`LockManager::get_policy_upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequest {
    /// Policy name
    pub name: String,
    /// Key type for a newly created policy
    pub key_type: KeyType,
    /// Require a context and derive per-context keys
    pub derived: bool,
    /// KDF for derived keys
    pub kdf: KdfMode,
    /// Deterministic encryption (AES only, requires `derived`)
    pub convergent_encryption: bool,
    /// Key material may be exported
    pub exportable: bool,
    /// The policy may later be deleted
    pub deletion_allowed: bool,
    /// Plaintext backups may be taken (requires `exportable`)
    pub allow_plaintext_backup: bool,
    /// Create the policy if it does not exist
    pub upsert: bool,
}

impl PolicyRequest {
    /// Request for `name` with every option off except `upsert`.
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            derived: false,
            kdf: KdfMode::default(),
            convergent_encryption: false,
            exportable: false,
            deletion_allowed: false,
            allow_plaintext_backup: false,
            upsert: true,
        }
    }

    /// Reject key type, derivation and convergence combinations that no
    /// policy may be created with.
    pub fn validate(&self) -> Result<(), KeyringError> {
        let invalid = |msg: &str| Err(KeyringError::InvalidPolicyConfig(format!("{}: {msg}", self.key_type)));

        match self.key_type {
            KeyType::Aes256Gcm96 => {
                if self.convergent_encryption && !self.derived {
                    return invalid("convergent encryption requires derivation to be enabled");
                }
            },
            KeyType::EcdsaP256 | KeyType::Rsa2048 | KeyType::Rsa4096 => {
                if self.derived {
                    return invalid("key derivation not supported for this key type");
                }
                if self.convergent_encryption {
                    return invalid("convergent encryption not supported for this key type");
                }
            },
            KeyType::Ed25519 => {
                if self.convergent_encryption {
                    return invalid("convergent encryption not supported for this key type");
                }
            },
        }
        Ok(())
    }
}

/// A policy held under its read lock.
pub struct PolicyReadGuard {
    policy: Arc<Policy>,
    _lock: ArcRwLockReadGuard<RawRwLock, ()>,
}

impl PolicyReadGuard {
    /// Shared handle to the loaded policy that outlives the lock.
    ///
    /// The handle is a snapshot: later rotations through the lock manager
    /// are not reflected in it.
    pub fn snapshot(&self) -> Arc<Policy> {
        Arc::clone(&self.policy)
    }
}

impl Deref for PolicyReadGuard {
    type Target = Policy;

    fn deref(&self) -> &Policy {
        &self.policy
    }
}

/// A policy held under its write lock.
///
/// Mutations are published to the cache when the guard drops, before the
/// lock is released. Use [`persist`](Self::persist) (or the operations that
/// persist internally) to make them durable.
pub struct PolicyWriteGuard<'a, S: Storage, E: Environment> {
    policy: Policy,
    storage: CancellableStorage<S>,
    env: E,
    cache: Option<&'a Mutex<HashMap<String, Arc<Policy>>>>,
    _lock: ArcRwLockWriteGuard<RawRwLock, ()>,
}

impl<S: Storage, E: Environment> PolicyWriteGuard<'_, S, E> {
    /// Add a key version and persist.
    pub fn rotate(&mut self) -> Result<(), KeyringError> {
        self.policy.rotate(&self.storage, &self.env)
    }

    /// Archive and write the policy record.
    pub fn persist(&mut self) -> Result<(), KeyringError> {
        self.policy.persist(&self.storage)
    }

    /// Apply and persist a configuration change.
    pub fn update_config(&mut self, update: &PolicyConfigUpdate) -> Result<bool, KeyringError> {
        self.policy.update_config(update, &self.storage)
    }

    /// Stamp, persist and return a plaintext backup.
    pub fn backup(&mut self) -> Result<String, KeyringError> {
        self.policy.backup(&self.storage, &self.env)
    }
}

impl<S: Storage, E: Environment> Deref for PolicyWriteGuard<'_, S, E> {
    type Target = Policy;

    fn deref(&self) -> &Policy {
        &self.policy
    }
}

impl<S: Storage, E: Environment> DerefMut for PolicyWriteGuard<'_, S, E> {
    fn deref_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }
}

impl<S: Storage, E: Environment> Drop for PolicyWriteGuard<'_, S, E> {
    fn drop(&mut self) {
        // Fields drop after this body, so the write lock is still held here
        if let Some(cache) = self.cache {
            cache.lock().insert(self.policy.name.clone(), Arc::new(self.policy.clone()));
        }
    }
}

/// Hands out policies under per-name read/write locks.
pub struct LockManager<S: Storage, E: Environment> {
    storage: S,
    env: E,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    cache: Option<Mutex<HashMap<String, Arc<Policy>>>>,
}

impl<S: Storage, E: Environment> LockManager<S, E> {
    /// Create a manager over `storage`.
    pub fn new(storage: S, env: E, config: LockManagerConfig) -> Self {
        Self {
            storage,
            env,
            locks: Mutex::new(HashMap::new()),
            cache: config.cache_enabled.then(|| Mutex::new(HashMap::new())),
        }
    }

    /// Whether loaded policies are cached.
    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Environment used for key generation and upgrades.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Load `name` under a read lock, upgrading it first if needed.
    ///
    /// Returns `None` if no such policy exists.
    pub fn get_policy_shared(
        &self,
        name: &str,
        token: &CancelToken,
    ) -> Result<Option<PolicyReadGuard>, KeyringError> {
        token.check()?;
        let storage = self.storage_for(token);
        let lock = self.lock_for(name);

        let read = lock.read_arc();
        if let Some(policy) = self.cached(name) {
            return Ok(Some(PolicyReadGuard { policy, _lock: read }));
        }
        let Some(policy) = load_policy(&storage, name)? else {
            return Ok(None);
        };
        if !policy.needs_upgrade() {
            let policy = self.publish(policy);
            return Ok(Some(PolicyReadGuard { policy, _lock: read }));
        }
        drop(read);

        debug!(policy = name, "escalating to write lock for upgrade");
        let write = lock.write_arc();
        let Some(policy) = self.load_upgraded(name, &storage)? else {
            return Ok(None);
        };
        Ok(Some(PolicyReadGuard { policy, _lock: ArcRwLockWriteGuard::downgrade(write) }))
    }

    /// Load `name` under its write lock.
    ///
    /// Returns `None` if no such policy exists.
    pub fn get_policy_exclusive(
        &self,
        name: &str,
        token: &CancelToken,
    ) -> Result<Option<PolicyWriteGuard<'_, S, E>>, KeyringError> {
        token.check()?;
        let storage = self.storage_for(token);
        let lock = self.lock_for(name);

        let write = lock.write_arc();
        let Some(policy) = self.load_upgraded(name, &storage)? else {
            return Ok(None);
        };

        Ok(Some(PolicyWriteGuard {
            policy: Policy::clone(&policy),
            storage,
            env: self.env.clone(),
            cache: self.cache.as_ref(),
            _lock: write,
        }))
    }

    /// Load the requested policy, creating it if absent and
    /// `request.upsert` is set.
    ///
    /// Returns the policy under a read lock and whether it was created, or
    /// `None` if it does not exist and `upsert` is off.
    pub fn get_policy_upsert(
        &self,
        request: &PolicyRequest,
        token: &CancelToken,
    ) -> Result<Option<(PolicyReadGuard, bool)>, KeyringError> {
        if let Some(existing) = self.get_policy_shared(&request.name, token)? {
            return Ok(Some((existing, false)));
        }
        if !request.upsert {
            return Ok(None);
        }
        request.validate()?;

        let storage = self.storage_for(token);
        let lock = self.lock_for(&request.name);
        let write = lock.write_arc();

        // Created by someone else between our read and write locks
        if let Some(policy) = self.load_upgraded(&request.name, &storage)? {
            return Ok(Some((
                PolicyReadGuard { policy, _lock: ArcRwLockWriteGuard::downgrade(write) },
                false,
            )));
        }

        let mut policy = Policy::new(request.name.clone(), request.key_type);
        policy.derived = request.derived;
        policy.kdf = request.kdf;
        policy.convergent_encryption = request.convergent_encryption;
        policy.exportable = request.exportable;
        policy.deletion_allowed = request.deletion_allowed;
        policy.allow_plaintext_backup = request.allow_plaintext_backup;
        if request.convergent_encryption {
            policy.convergent_version = 2;
        }
        policy.rotate(&storage, &self.env)?;
        info!(policy = %request.name, key_type = %request.key_type, "policy created");

        let policy = self.publish(policy);
        Ok(Some((PolicyReadGuard { policy, _lock: ArcRwLockWriteGuard::downgrade(write) }, true)))
    }

    /// Delete `name` and its archive.
    pub fn delete_policy(&self, name: &str, token: &CancelToken) -> Result<(), KeyringError> {
        token.check()?;
        let storage = self.storage_for(token);
        let lock = self.lock_for(name);
        let _write = lock.write_arc();

        let policy = match self.cached(name) {
            Some(policy) => policy,
            None => Arc::new(
                load_policy(&storage, name)?
                    .ok_or_else(|| KeyringError::PolicyNotFound(name.to_string()))?,
            ),
        };
        if !policy.deletion_allowed {
            return Err(KeyringError::DeletionNotAllowed(name.to_string()));
        }

        self.invalidate_policy(name);
        storage.delete(&policy_path(name))?;
        storage.delete(&archive_path(name))?;
        info!(policy = name, "policy deleted");
        Ok(())
    }

    /// Write a backup from [`PolicyWriteGuard::backup`] back to storage.
    ///
    /// The policy is stored under `name`, or under the name recorded in the
    /// backup when `name` is `None`. An existing policy is only replaced when
    /// `force` is set. If either write fails the previous archive record is
    /// put back.
    pub fn restore_policy(
        &self,
        name: Option<&str>,
        backup: &str,
        force: bool,
        token: &CancelToken,
    ) -> Result<(), KeyringError> {
        token.check()?;
        let PolicyBackup { mut policy, archived_keys } = PolicyBackup::decode(backup)?;
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => policy.name.clone(),
        };
        if name.is_empty() {
            return Err(KeyringError::InvalidInput("backup does not name a policy".into()));
        }

        let storage = self.storage_for(token);
        let lock = self.lock_for(&name);
        let _write = lock.write_arc();

        if !force && (self.cached(&name).is_some() || storage.get(&policy_path(&name))?.is_some()) {
            return Err(KeyringError::PolicyExists(name));
        }

        policy.name = name.clone();
        policy.restore_info = Some(VersionStamp { time: self.env.now(), version: policy.latest_version });
        policy.check_invariants()?;

        let prior_archive = storage.get(&archive_path(&name))?;
        self.invalidate_policy(&name);

        let written = store_archive(&storage, &name, &archived_keys).and_then(|()| policy.persist(&storage));
        if let Err(err) = written {
            warn!(policy = %name, error = %err, "restore failed, putting back previous archive");
            let undo = match prior_archive {
                Some(entry) => storage.put(&entry),
                None => storage.delete(&archive_path(&name)),
            };
            if let Err(undo_err) = undo {
                warn!(policy = %name, error = %undo_err, "could not put back previous archive");
            }
            return Err(err);
        }

        info!(policy = %name, version = policy.latest_version, "policy restored");
        self.publish(policy);
        Ok(())
    }

    /// Drop `name` from the cache. Takes no policy lock.
    pub fn invalidate_policy(&self, name: &str) {
        if let Some(cache) = &self.cache {
            cache.lock().remove(name);
        }
    }

    fn storage_for(&self, token: &CancelToken) -> CancellableStorage<S> {
        CancellableStorage::new(self.storage.clone(), token.clone())
    }

    fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    fn cached(&self, name: &str) -> Option<Arc<Policy>> {
        let hit = self.cache.as_ref()?.lock().get(name).cloned();
        debug!(policy = name, hit = hit.is_some(), "policy cache lookup");
        hit
    }

    fn publish(&self, policy: Policy) -> Arc<Policy> {
        let policy = Arc::new(policy);
        if let Some(cache) = &self.cache {
            cache.lock().insert(policy.name.clone(), Arc::clone(&policy));
        }
        policy
    }

    /// Cache or storage lookup that upgrades old records. Caller holds the
    /// write lock.
    fn load_upgraded(
        &self,
        name: &str,
        storage: &CancellableStorage<S>,
    ) -> Result<Option<Arc<Policy>>, KeyringError> {
        if let Some(policy) = self.cached(name) {
            return Ok(Some(policy));
        }
        let Some(mut policy) = load_policy(storage, name)? else {
            return Ok(None);
        };
        if policy.needs_upgrade() {
            policy.upgrade(storage, &self.env)?;
        }
        Ok(Some(self.publish(policy)))
    }
}
