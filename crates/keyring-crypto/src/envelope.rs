//! The `vault:v<N>:<payload>` envelope around ciphertexts, signatures and
//! HMACs.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};

const PREFIX: &str = "vault:v";

/// Why an envelope was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidCiphertextReason {
    /// Missing the `vault:v` prefix
    NoPrefix,
    /// No `:` between version and payload
    WrongFields,
    /// Version is not a non-negative decimal integer
    BadVersion,
    /// Payload is not valid base64
    BadBase64,
    /// Payload shorter than the nonce it must carry
    ShortNonce,
    /// AEAD or key-level failure
    DecryptFailed,
}

impl InvalidCiphertextReason {
    /// Stable identifier.
    pub fn code(self) -> &'static str {
        match self {
            Self::NoPrefix => "no_prefix",
            Self::WrongFields => "wrong_fields",
            Self::BadVersion => "bad_version",
            Self::BadBase64 => "bad_base64",
            Self::ShortNonce => "short_nonce",
            Self::DecryptFailed => "decrypt_failed",
        }
    }
}

impl fmt::Display for InvalidCiphertextReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A parsed envelope borrowing its payload from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Key version. A literal `0` in the input is reported as `1`.
    pub version: u32,
    /// Encoded payload after the second colon, not yet decoded.
    pub payload: &'a str,
}

impl<'a> Envelope<'a> {
    /// Split `input` into version and payload.
    pub fn parse(input: &'a str) -> Result<Self, InvalidCiphertextReason> {
        let rest = input.strip_prefix(PREFIX).ok_or(InvalidCiphertextReason::NoPrefix)?;
        let (version, payload) = rest.split_once(':').ok_or(InvalidCiphertextReason::WrongFields)?;

        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidCiphertextReason::BadVersion);
        }
        let version: u32 = version.parse().map_err(|_| InvalidCiphertextReason::BadVersion)?;

        Ok(Self { version: version.max(1), payload })
    }

    /// Decode the payload as standard padded base64.
    pub fn decode_payload(&self) -> Result<Vec<u8>, InvalidCiphertextReason> {
        STANDARD.decode(self.payload).map_err(|_| InvalidCiphertextReason::BadBase64)
    }
}

/// Render `vault:v<version>:<base64(payload)>`.
pub fn render(version: u32, payload: &[u8]) -> String {
    render_encoded(version, &STANDARD.encode(payload))
}

/// Render an envelope around an already-encoded payload.
pub fn render_encoded(version: u32, encoded: &str) -> String {
    format!("{PREFIX}{version}:{encoded}")
}
