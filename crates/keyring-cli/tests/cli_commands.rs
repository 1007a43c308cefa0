//! End-to-end command runs against a temporary database.

use std::path::Path;

use clap::Parser;
use keyring_cli::{Cli, CliError, execute, run};
use keyring_core::{LockManager, LockManagerConfig, SystemEnv};
use keyring_storage::MemoryStorage;
use serde_json::Value;
use tempfile::TempDir;

fn keyring(db: &Path, args: &[&str]) -> Result<Value, CliError> {
    let db = db.to_str().unwrap();
    let argv = ["keyring", "--db", db].into_iter().chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv).unwrap();

    let mut out = Vec::new();
    run(cli, &mut out)?;
    assert_eq!(out.last(), Some(&b'\n'));
    Ok(serde_json::from_slice(&out).unwrap())
}

fn db() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keyring.redb");
    (dir, path)
}

#[test]
fn encrypt_rotate_decrypt() {
    let (_dir, db) = db();

    let created = keyring(&db, &["create", "orders"]).unwrap();
    assert_eq!(created["created"], true);
    assert_eq!(created["latest_version"], 1);

    let again = keyring(&db, &["create", "orders"]).unwrap();
    assert_eq!(again["created"], false);

    let ct = keyring(&db, &["encrypt", "orders", "--plaintext", "aGVsbG8="]).unwrap();
    let ct = ct["ciphertext"].as_str().unwrap().to_string();
    assert!(ct.starts_with("vault:v1:"));

    let rotated = keyring(&db, &["rotate", "orders"]).unwrap();
    assert_eq!(rotated["latest_version"], 2);

    let pt = keyring(&db, &["decrypt", "orders", "--ciphertext", &ct]).unwrap();
    assert_eq!(pt["plaintext"], "aGVsbG8=");

    let fresh = keyring(&db, &["encrypt", "orders", "--plaintext", "aGVsbG8="]).unwrap();
    assert!(fresh["ciphertext"].as_str().unwrap().starts_with("vault:v2:"));
}

#[test]
fn min_decryption_version_rejects_old_ciphertext() {
    let (_dir, db) = db();
    keyring(&db, &["create", "orders"]).unwrap();
    let ct = keyring(&db, &["encrypt", "orders", "--plaintext", "aGk="]).unwrap();
    let ct = ct["ciphertext"].as_str().unwrap().to_string();

    keyring(&db, &["rotate", "orders"]).unwrap();
    let config = keyring(&db, &["config", "orders", "--min-decryption-version", "2"]).unwrap();
    assert_eq!(config["changed"], true);
    assert_eq!(config["min_decryption_version"], 2);

    let shown = keyring(&db, &["show", "orders"]).unwrap();
    assert_eq!(shown["versions"], serde_json::json!([2]));
    assert_eq!(shown["archive_version"], 2);

    let err = keyring(&db, &["decrypt", "orders", "--ciphertext", &ct]).unwrap_err();
    assert_eq!(err.code(), "too_old");
}

#[test]
fn backup_and_restore_between_databases() {
    let (_src_dir, src) = db();
    keyring(&src, &["create", "orders", "--exportable"]).unwrap();
    let err = keyring(&src, &["backup", "orders"]).unwrap_err();
    assert_eq!(err.code(), "backup_not_allowed");

    keyring(&src, &["config", "orders", "--allow-plaintext-backup", "true"]).unwrap();
    let ct = keyring(&src, &["encrypt", "orders", "--plaintext", "aGk="]).unwrap();
    let ct = ct["ciphertext"].as_str().unwrap().to_string();
    let backup = keyring(&src, &["backup", "orders"]).unwrap();
    let backup = backup["backup"].as_str().unwrap().to_string();

    let (_dst_dir, dst) = db();
    let restored = keyring(&dst, &["restore", &backup]).unwrap();
    assert_eq!(restored["restored"], "orders");
    let pt = keyring(&dst, &["decrypt", "orders", "--ciphertext", &ct]).unwrap();
    assert_eq!(pt["plaintext"], "aGk=");

    let err = keyring(&dst, &["restore", &backup]).unwrap_err();
    assert_eq!(err.code(), "policy_exists");
    keyring(&dst, &["restore", &backup, "--force"]).unwrap();
    let renamed = keyring(&dst, &["restore", &backup, "--name", "copy"]).unwrap();
    assert_eq!(renamed["restored"], "copy");
}

#[test]
fn sign_and_verify() {
    let (_dir, db) = db();
    keyring(&db, &["create", "signer", "--type", "ecdsa-p256"]).unwrap();

    let signed = keyring(&db, &["sign", "signer", "--input", "AQID", "--marshaling", "jws"]).unwrap();
    let signature = signed["signature"].as_str().unwrap().to_string();
    assert_eq!(signed["public_key"], Value::Null);

    let ok = keyring(
        &db,
        &["verify", "signer", "--input", "AQID", "--signature", &signature, "--marshaling", "jws"],
    )
    .unwrap();
    assert_eq!(ok["valid"], true);

    let other = keyring(
        &db,
        &["verify", "signer", "--input", "AQIE", "--signature", &signature, "--marshaling", "jws"],
    )
    .unwrap();
    assert_eq!(other["valid"], false);

    let keys = keyring(&db, &["keys", "signer"]).unwrap();
    assert!(keys["keys"][0]["public_key"].as_str().unwrap().contains("PUBLIC KEY"));
}

#[test]
fn derived_ed25519_returns_public_key() {
    let (_dir, db) = db();
    keyring(&db, &["create", "devices", "--type", "ed25519", "--derived"]).unwrap();

    let signed =
        keyring(&db, &["sign", "devices", "--input", "AQID", "--context", "ZGV2aWNlLTE="]).unwrap();
    assert!(signed["public_key"].is_string());

    let err = keyring(&db, &["sign", "devices", "--input", "AQID"]).unwrap_err();
    assert_eq!(err.code(), "missing_context");
}

#[test]
fn hmac_roundtrip() {
    let (_dir, db) = db();
    keyring(&db, &["create", "macs"]).unwrap();

    let mac = keyring(&db, &["hmac", "macs", "--input", "AQID", "--hash", "sha2-512"]).unwrap();
    let mac = mac["hmac"].as_str().unwrap().to_string();

    let valid =
        keyring(&db, &["verify-hmac", "macs", "--input", "AQID", "--hmac", &mac, "--hash", "sha2-512"]).unwrap();
    assert_eq!(valid["valid"], true);
}

#[test]
fn delete_requires_permission() {
    let (_dir, db) = db();
    keyring(&db, &["create", "orders"]).unwrap();

    let err = keyring(&db, &["delete", "orders"]).unwrap_err();
    assert_eq!(err.code(), "deletion_not_allowed");

    keyring(&db, &["config", "orders", "--deletion-allowed", "true"]).unwrap();
    keyring(&db, &["delete", "orders"]).unwrap();

    let err = keyring(&db, &["show", "orders"]).unwrap_err();
    assert_eq!(err.code(), "policy_not_found");
}

#[test]
fn eks_put_get_list_delete() {
    let (_dir, db) = db();

    keyring(&db, &["eks", "put", "users/alice", "a-secret"]).unwrap();
    keyring(&db, &["eks", "put", "users/bob/token", "b-secret"]).unwrap();

    let got = keyring(&db, &["eks", "get", "users/alice"]).unwrap();
    assert_eq!(got["value"], "a-secret");

    let listed = keyring(&db, &["eks", "list", "users/"]).unwrap();
    assert_eq!(listed["keys"], serde_json::json!(["alice", "bob/"]));

    keyring(&db, &["eks", "delete", "users/alice"]).unwrap();
    let gone = keyring(&db, &["eks", "get", "users/alice"]).unwrap();
    assert_eq!(gone["value"], Value::Null);

    let policy = keyring(&db, &["show", "eks"]).unwrap();
    assert_eq!(policy["derived"], true);
    assert_eq!(policy["convergent_version"], 2);
}

#[test]
fn eks_rejects_unsuitable_policy() {
    let (_dir, db) = db();
    keyring(&db, &["create", "plain"]).unwrap();

    let err = keyring(&db, &["eks", "--policy", "plain", "list"]).unwrap_err();
    assert_eq!(err.code(), "policy_derived_required");
}

#[test]
fn bad_base64_is_reported() {
    let (_dir, db) = db();
    keyring(&db, &["create", "orders"]).unwrap();

    let err = keyring(&db, &["encrypt", "orders", "--plaintext", "aGk=", "--context", "!!"]).unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[test]
fn execute_against_memory_storage() {
    for cache_enabled in [true, false] {
        let manager = LockManager::new(MemoryStorage::new(), SystemEnv::new(), LockManagerConfig { cache_enabled });
        let mut out = Vec::new();

        for args in [&["keyring", "create", "k"][..], &["keyring", "rotate", "k"], &["keyring", "show", "k"]] {
            let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
            execute(&manager, &cli.eks_prefix, cli.command, &mut out).unwrap();
        }

        let lines: Vec<Value> =
            out.split(|b| *b == b'\n').filter(|l| !l.is_empty()).map(|l| serde_json::from_slice(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["versions"], serde_json::json!([1, 2]));
    }
}
