//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use keyring_core::{HashAlgorithm, KdfMode, KeyType, Marshaling, RsaPadding, SignOptions};
use keyring_eks::DEFAULT_PREFIX;
use tracing_subscriber::EnvFilter;

/// Log filter when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Keyring operator tool
#[derive(Parser, Debug)]
#[command(name = "keyring")]
#[command(about = "Manage versioned keyring policies and encrypted key storage")]
#[command(version)]
pub struct Cli {
    /// Database file
    #[arg(long, default_value = "keyring.redb")]
    pub db: PathBuf,

    /// Log filter (trace, debug, info, warn, error); overrides `RUST_LOG`
    #[arg(long)]
    pub log_level: Option<String>,

    /// Load policies from storage on every access
    #[arg(long)]
    pub no_cache: bool,

    /// Storage prefix for encrypted key storage
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub eks_prefix: String,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Filter from `--log-level`, else `RUST_LOG`, else [`DEFAULT_LOG_LEVEL`].
    pub fn log_filter(&self) -> EnvFilter {
        match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        }
    }
}

/// Operations on a single policy, or on encrypted key storage.
///
/// Binary inputs (plaintext, context, nonce, signing input) are base64.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a policy with one key version
    Create {
        /// Policy name
        name: String,
        /// Key type
        #[arg(long = "type", default_value = "aes256-gcm96")]
        key_type: KeyType,
        /// Derive a key per context
        #[arg(long)]
        derived: bool,
        /// Deterministic encryption; requires --derived
        #[arg(long)]
        convergent: bool,
        /// Key derivation function for derived keys
        #[arg(long, value_enum, default_value_t = Kdf::Hkdf)]
        kdf: Kdf,
        /// Allow key export
        #[arg(long)]
        exportable: bool,
        /// Allow the policy to be deleted
        #[arg(long)]
        allow_deletion: bool,
        /// Allow plaintext backups; requires --exportable
        #[arg(long)]
        allow_plaintext_backup: bool,
    },

    /// Add a key version
    Rotate {
        /// Policy name
        name: String,
    },

    /// Print a policy's configuration and versions
    Show {
        /// Policy name
        name: String,
    },

    /// Print the public key of every version
    Keys {
        /// Policy name
        name: String,
    },

    /// Encrypt base64 plaintext
    Encrypt {
        /// Policy name
        name: String,
        /// Base64 plaintext
        #[arg(long)]
        plaintext: String,
        /// Base64 derivation context
        #[arg(long)]
        context: Option<String>,
        /// Base64 nonce, for convergent version 1 policies
        #[arg(long)]
        nonce: Option<String>,
        /// Key version; 0 selects the latest
        #[arg(long, default_value_t = 0)]
        key_version: u32,
    },

    /// Decrypt a `vault:v<N>:` ciphertext
    Decrypt {
        /// Policy name
        name: String,
        /// Ciphertext envelope
        #[arg(long)]
        ciphertext: String,
        /// Base64 derivation context
        #[arg(long)]
        context: Option<String>,
        /// Base64 nonce, for convergent version 1 policies
        #[arg(long)]
        nonce: Option<String>,
    },

    /// Sign base64 input
    Sign {
        /// Policy name
        name: String,
        /// Base64 input
        #[arg(long)]
        input: String,
        /// Base64 derivation context
        #[arg(long)]
        context: Option<String>,
        /// Key version; 0 selects the latest
        #[arg(long, default_value_t = 0)]
        key_version: u32,
        /// Signature options
        #[command(flatten)]
        options: SignatureArgs,
    },

    /// Verify a signature over base64 input
    Verify {
        /// Policy name
        name: String,
        /// Base64 input
        #[arg(long)]
        input: String,
        /// Signature envelope
        #[arg(long)]
        signature: String,
        /// Base64 derivation context
        #[arg(long)]
        context: Option<String>,
        /// Signature options
        #[command(flatten)]
        options: SignatureArgs,
    },

    /// HMAC base64 input
    Hmac {
        /// Policy name
        name: String,
        /// Base64 input
        #[arg(long)]
        input: String,
        /// Digest
        #[arg(long, default_value = "sha2-256")]
        hash: HashAlgorithm,
        /// Key version; 0 selects the latest
        #[arg(long, default_value_t = 0)]
        key_version: u32,
    },

    /// Check an HMAC over base64 input
    VerifyHmac {
        /// Policy name
        name: String,
        /// Base64 input
        #[arg(long)]
        input: String,
        /// HMAC envelope
        #[arg(long)]
        hmac: String,
        /// Digest
        #[arg(long, default_value = "sha2-256")]
        hash: HashAlgorithm,
    },

    /// Change version bounds or flags
    Config {
        /// Policy name
        name: String,
        /// Oldest version allowed to decrypt and verify
        #[arg(long)]
        min_decryption_version: Option<u32>,
        /// Oldest version allowed to encrypt and sign; 0 clears it
        #[arg(long)]
        min_encryption_version: Option<u32>,
        /// Allow or forbid deletion
        #[arg(long)]
        deletion_allowed: Option<bool>,
        /// Mark exportable
        #[arg(long)]
        exportable: Option<bool>,
        /// Permit plaintext backups
        #[arg(long)]
        allow_plaintext_backup: Option<bool>,
    },

    /// Print a plaintext backup of a policy and all its versions
    Backup {
        /// Policy name
        name: String,
    },

    /// Store a policy from a backup
    Restore {
        /// Output of `backup`
        backup: String,
        /// Store under this name instead of the one in the backup
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing policy
        #[arg(long)]
        force: bool,
    },

    /// Delete a policy and its archive
    Delete {
        /// Policy name
        name: String,
    },

    /// Encrypted key storage
    Eks {
        /// Path-encrypting policy; created derived and convergent if absent
        #[arg(long, default_value = "eks")]
        policy: String,
        /// Storage operation
        #[command(subcommand)]
        command: EksCommand,
    },
}

/// Encrypted key storage operations. Paths are logical paths.
#[derive(Subcommand, Debug)]
pub enum EksCommand {
    /// Store a value
    Put {
        /// Logical path
        path: String,
        /// Value, stored as UTF-8
        value: String,
    },
    /// Read a value
    Get {
        /// Logical path
        path: String,
    },
    /// List names under a path
    List {
        /// Logical directory
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Remove a value
    Delete {
        /// Logical path
        path: String,
    },
}

/// Key derivation function choice.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    /// HKDF-SHA256
    Hkdf,
    /// Counter-mode KDF over HMAC-SHA256
    HmacCounter,
}

impl From<Kdf> for KdfMode {
    fn from(value: Kdf) -> Self {
        match value {
            Kdf::Hkdf => KdfMode::HkdfSha256,
            Kdf::HmacCounter => KdfMode::HmacSha256Counter,
        }
    }
}

/// Signature knobs shared by `sign` and `verify`.
#[derive(Args, Debug, Clone)]
pub struct SignatureArgs {
    /// Digest for prehashing and RSA padding
    #[arg(long, default_value = "sha2-256")]
    pub hash: HashAlgorithm,
    /// RSA padding (pss, pkcs1v15)
    #[arg(long, default_value = "pss")]
    pub padding: RsaPadding,
    /// Signature encoding (asn1, jws)
    #[arg(long, default_value = "asn1")]
    pub marshaling: Marshaling,
    /// Input is already a digest
    #[arg(long)]
    pub prehashed: bool,
}

impl From<&SignatureArgs> for SignOptions {
    fn from(args: &SignatureArgs) -> Self {
        Self {
            hash: args.hash,
            rsa_padding: args.padding,
            marshaling: args.marshaling,
            prehashed: args.prehashed,
        }
    }
}
