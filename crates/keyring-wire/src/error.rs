//! Wire format errors.

use thiserror::Error;

/// Errors from compression framing and request envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Nothing to decompress or decode
    #[error("{0} input is empty")]
    Empty(&'static str),

    /// Stream starts with the canary of an algorithm this build cannot read
    #[error("unsupported compression canary {0:?}")]
    UnsupportedCompression(char),

    /// Compressed stream is malformed or too large
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// JSON encode or decode failed
    #[error("json: {0}")]
    Json(String),

    /// Binary encode or decode failed
    #[error("binary encoding: {0}")]
    Binary(String),

    /// Reading the request body failed
    #[error("reading request body: {0}")]
    Io(String),
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
