//! Command execution against a lock manager.

use std::io::Write;

use base64::{Engine, engine::general_purpose::STANDARD};
use keyring_core::{
    CancelToken, Environment, KeyType, KeyringError, LockManager, PolicyBackup, PolicyConfigUpdate,
    PolicyReadGuard, PolicyRequest, SignOptions,
};
use keyring_eks::EncryptedKeyStorage;
use keyring_storage::{Storage, StorageEntry};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    CliError,
    args::{Command, EksCommand},
};

/// Run `command` and write its result to `out` as one line of JSON.
pub fn execute<S: Storage, E: Environment, W: Write>(
    manager: &LockManager<S, E>,
    eks_prefix: &str,
    command: Command,
    out: &mut W,
) -> Result<(), CliError> {
    let token = CancelToken::new();

    let result = match command {
        Command::Create {
            name,
            key_type,
            derived,
            convergent,
            kdf,
            exportable,
            allow_deletion,
            allow_plaintext_backup,
        } => {
            let request = PolicyRequest {
                derived,
                kdf: kdf.into(),
                convergent_encryption: convergent,
                exportable,
                deletion_allowed: allow_deletion,
                allow_plaintext_backup,
                ..PolicyRequest::new(name, key_type)
            };
            let (policy, created) = manager
                .get_policy_upsert(&request, &token)?
                .ok_or_else(|| KeyringError::PolicyNotFound(request.name.clone()))?;
            if !created {
                info!(policy = %policy.name, "policy already exists");
            }
            json!({
                "name": policy.name,
                "created": created,
                "type": policy.key_type.as_str(),
                "latest_version": policy.latest_version,
            })
        },

        Command::Rotate { name } => {
            let mut policy = manager
                .get_policy_exclusive(&name, &token)?
                .ok_or_else(|| KeyringError::PolicyNotFound(name.clone()))?;
            policy.rotate()?;
            json!({ "name": name, "latest_version": policy.latest_version })
        },

        Command::Show { name } => {
            let policy = shared(manager, &name, &token)?;
            json!({
                "name": policy.name,
                "type": policy.key_type.as_str(),
                "derived": policy.derived,
                "convergent_encryption": policy.convergent_encryption,
                "convergent_version": policy.convergent_version,
                "exportable": policy.exportable,
                "deletion_allowed": policy.deletion_allowed,
                "allow_plaintext_backup": policy.allow_plaintext_backup,
                "latest_version": policy.latest_version,
                "min_decryption_version": policy.min_decryption_version,
                "min_encryption_version": policy.min_encryption_version,
                "archive_version": policy.archive_version,
                "versions": policy.keys.keys().collect::<Vec<_>>(),
            })
        },

        Command::Keys { name } => {
            let policy = shared(manager, &name, &token)?;
            let keys: Vec<Value> = policy
                .public_keys()?
                .into_iter()
                .map(|key| {
                    json!({
                        "version": key.version,
                        "creation_time": key.creation_time.to_rfc3339(),
                        "public_key": key.public_key,
                    })
                })
                .collect();
            json!({ "name": name, "keys": keys })
        },

        Command::Encrypt { name, plaintext, context, nonce, key_version } => {
            let context = decode("context", context.as_deref())?;
            let nonce = nonce.as_deref().map(|n| decode("nonce", Some(n))).transpose()?;
            let policy = shared(manager, &name, &token)?;
            let ciphertext =
                policy.encrypt(manager.env(), key_version, &context, nonce.as_deref(), &plaintext)?;
            json!({ "ciphertext": ciphertext })
        },

        Command::Decrypt { name, ciphertext, context, nonce } => {
            let context = decode("context", context.as_deref())?;
            let nonce = nonce.as_deref().map(|n| decode("nonce", Some(n))).transpose()?;
            let policy = shared(manager, &name, &token)?;
            let plaintext = policy.decrypt(&context, nonce.as_deref(), &ciphertext)?;
            json!({ "plaintext": plaintext })
        },

        Command::Sign { name, input, context, key_version, options } => {
            let input = decode("input", Some(input.as_str()))?;
            let context = decode("context", context.as_deref())?;
            let policy = shared(manager, &name, &token)?;
            let signed =
                policy.sign(manager.env(), key_version, &context, &input, &SignOptions::from(&options))?;
            json!({
                "signature": signed.signature,
                "public_key": signed.public_key.map(|key| STANDARD.encode(key)),
            })
        },

        Command::Verify { name, input, signature, context, options } => {
            let input = decode("input", Some(input.as_str()))?;
            let context = decode("context", context.as_deref())?;
            let policy = shared(manager, &name, &token)?;
            let valid =
                policy.verify_signature(&context, &input, &signature, &SignOptions::from(&options))?;
            json!({ "valid": valid })
        },

        Command::Hmac { name, input, hash, key_version } => {
            let input = decode("input", Some(input.as_str()))?;
            let policy = shared(manager, &name, &token)?;
            json!({ "hmac": policy.hmac(key_version, &input, hash)? })
        },

        Command::VerifyHmac { name, input, hmac, hash } => {
            let input = decode("input", Some(input.as_str()))?;
            let policy = shared(manager, &name, &token)?;
            json!({ "valid": policy.verify_hmac(&input, &hmac, hash)? })
        },

        Command::Config {
            name,
            min_decryption_version,
            min_encryption_version,
            deletion_allowed,
            exportable,
            allow_plaintext_backup,
        } => {
            let update = PolicyConfigUpdate {
                min_decryption_version,
                min_encryption_version,
                deletion_allowed,
                exportable,
                allow_plaintext_backup,
            };
            let mut policy = manager
                .get_policy_exclusive(&name, &token)?
                .ok_or_else(|| KeyringError::PolicyNotFound(name.clone()))?;
            let changed = policy.update_config(&update)?;
            json!({
                "name": name,
                "changed": changed,
                "min_decryption_version": policy.min_decryption_version,
                "min_encryption_version": policy.min_encryption_version,
                "deletion_allowed": policy.deletion_allowed,
                "exportable": policy.exportable,
                "allow_plaintext_backup": policy.allow_plaintext_backup,
            })
        },

        Command::Backup { name } => {
            let mut policy = manager
                .get_policy_exclusive(&name, &token)?
                .ok_or_else(|| KeyringError::PolicyNotFound(name.clone()))?;
            json!({ "name": name, "backup": policy.backup()? })
        },

        Command::Restore { backup, name, force } => {
            manager.restore_policy(name.as_deref(), &backup, force, &token)?;
            let restored = match name {
                Some(name) => name,
                None => PolicyBackup::decode(&backup)?.policy.name,
            };
            json!({ "restored": restored })
        },

        Command::Delete { name } => {
            manager.delete_policy(&name, &token)?;
            json!({ "deleted": name })
        },

        Command::Eks { policy, command } => eks(manager, eks_prefix, &policy, command, &token)?,
    };

    serde_json::to_writer(&mut *out, &result).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

fn eks<S: Storage, E: Environment>(
    manager: &LockManager<S, E>,
    prefix: &str,
    policy: &str,
    command: EksCommand,
    token: &CancelToken,
) -> Result<Value, CliError> {
    let request = PolicyRequest {
        derived: true,
        convergent_encryption: true,
        ..PolicyRequest::new(policy, KeyType::Aes256Gcm96)
    };
    let (guard, created) = manager
        .get_policy_upsert(&request, token)?
        .ok_or_else(|| KeyringError::PolicyNotFound(policy.to_string()))?;
    if created {
        info!(policy, "created path-encrypting policy");
    }
    let snapshot = guard.snapshot();
    drop(guard);

    let storage = EncryptedKeyStorage::builder()
        .storage(manager.storage().clone())
        .policy(snapshot)
        .prefix(prefix)
        .build()?
        .with_cancel(token);
    debug!(prefix = storage.prefix(), "encrypted key storage opened");

    let result = match command {
        EksCommand::Put { path, value } => {
            storage.put(&StorageEntry::new(path.as_str(), value.into_bytes()))?;
            json!({ "path": path })
        },
        EksCommand::Get { path } => {
            let value = storage.get(&path)?.map(|entry| String::from_utf8_lossy(&entry.value).into_owned());
            json!({ "path": path, "value": value })
        },
        EksCommand::List { prefix } => json!({ "prefix": prefix, "keys": storage.list(&prefix)? }),
        EksCommand::Delete { path } => {
            storage.delete(&path)?;
            json!({ "deleted": path })
        },
    };
    Ok(result)
}

fn shared<S: Storage, E: Environment>(
    manager: &LockManager<S, E>,
    name: &str,
    token: &CancelToken,
) -> Result<PolicyReadGuard, CliError> {
    manager
        .get_policy_shared(name, token)?
        .ok_or_else(|| KeyringError::PolicyNotFound(name.to_string()).into())
}

fn decode(flag: &'static str, value: Option<&str>) -> Result<Vec<u8>, CliError> {
    value.map_or(Ok(Vec::new()), |v| STANDARD.decode(v).map_err(|_| CliError::BadBase64(flag)))
}
