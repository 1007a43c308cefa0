//! CLI errors.

use std::io;

use keyring_core::KeyringError;
use keyring_eks::EksError;
use keyring_storage::StorageError;
use thiserror::Error;

/// Anything a command can fail with.
#[derive(Error, Debug)]
pub enum CliError {
    /// Policy operation failed
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// Encrypted key storage operation failed
    #[error(transparent)]
    Eks(#[from] EksError),

    /// Opening or using the database failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An argument expected to be base64 was not
    #[error("--{0} is not valid base64")]
    BadBase64(&'static str),

    /// Writing to stdout failed
    #[error("writing output: {0}")]
    Output(#[from] io::Error),
}

impl CliError {
    /// Stable identifier, matching the library codes where there is one.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Keyring(err) => err.code(),
            Self::Eks(err) => err.code(),
            Self::Storage(_) => "storage",
            Self::BadBase64(_) => "invalid_input",
            Self::Output(_) => "output",
        }
    }
}
