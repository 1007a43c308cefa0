//! Keyring CLI
//!
//! Operator tool over a redb-backed keyring. Every command prints one line
//! of JSON on stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! keyring create orders
//! keyring encrypt orders --plaintext aGVsbG8=
//! keyring rotate orders
//! keyring config orders --min-decryption-version 2
//!
//! keyring create signer --type ed25519
//! keyring sign signer --input AQID
//!
//! keyring eks put users/alice secret
//! keyring eks list users/
//!
//! keyring create vault --exportable --allow-plaintext-backup
//! keyring --db other.redb restore "$(keyring backup vault | jq -r .backup)"
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod args;
mod commands;
mod error;

use std::io::Write;

use keyring_core::{LockManager, LockManagerConfig, SystemEnv};
use keyring_storage::RedbStorage;
use tracing::debug;

pub use args::{Cli, Command, DEFAULT_LOG_LEVEL, EksCommand, Kdf, SignatureArgs};
pub use commands::execute;
pub use error::CliError;

/// Open the database named by `cli` and run its command.
pub fn run<W: Write>(cli: Cli, out: &mut W) -> Result<(), CliError> {
    let storage = RedbStorage::open(&cli.db)?;
    debug!(db = %cli.db.display(), cache = !cli.no_cache, "opened keyring database");

    let manager =
        LockManager::new(storage, SystemEnv::new(), LockManagerConfig { cache_enabled: !cli.no_cache });
    execute(&manager, &cli.eks_prefix, cli.command, out)
}
