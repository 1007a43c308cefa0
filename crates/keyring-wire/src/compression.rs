//! Compression framing with a one-byte canary.
//!
//! Compressed buffers start with a byte naming the algorithm. Anything that
//! does not start with a known canary is passed through untouched, so JSON
//! (which starts with `{`) can be sent compressed or not.
//!
//! ```text
//! ┌────────┬──────────────────┬─────────────────────┐
//! │ canary │ size (u32 LE)    │ LZ4 block           │
//! │ '4'    │ uncompressed len │                     │
//! └────────┴──────────────────┴─────────────────────┘
//! ```

use std::borrow::Cow;

use tracing::debug;

use crate::WireError;

/// Canary of LZ4 block compression.
pub const CANARY_LZ4: u8 = b'4';

/// Canaries of algorithms other peers may emit but this build does not
/// decode (gzip, LZW, snappy).
const FOREIGN_CANARIES: [u8; 3] = [b'G', b'L', b'S'];

/// Largest accepted decompressed size (16 MiB).
pub const MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

/// Compression algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionType {
    /// LZ4 block format with the uncompressed size prepended
    #[default]
    Lz4,
}

impl CompressionType {
    /// Canary byte written in front of the compressed data.
    pub fn canary(self) -> u8 {
        match self {
            Self::Lz4 => CANARY_LZ4,
        }
    }
}

/// Compress `data` and prefix the algorithm's canary.
pub fn compress(data: &[u8], kind: CompressionType) -> Vec<u8> {
    let body = match kind {
        CompressionType::Lz4 => lz4_flex::compress_prepend_size(data),
    };

    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(kind.canary());
    out.extend_from_slice(&body);
    out
}

/// Undo [`compress`].
///
/// Returns the data and whether it was passed through because it carried
/// no canary.
pub fn decompress(data: &[u8]) -> Result<(Cow<'_, [u8]>, bool), WireError> {
    let Some((&canary, body)) = data.split_first() else {
        return Err(WireError::Empty("compressed"));
    };

    match canary {
        CANARY_LZ4 => {
            let Some(size) = body.first_chunk::<4>() else {
                return Err(WireError::Decompression("LZ4 data too short for size prefix".into()));
            };
            let claimed = u32::from_le_bytes(*size) as usize;
            if claimed > MAX_DECOMPRESSED_SIZE {
                return Err(WireError::Decompression(format!(
                    "claimed size {claimed} exceeds maximum {MAX_DECOMPRESSED_SIZE}"
                )));
            }

            let out = lz4_flex::decompress_size_prepended(body)
                .map_err(|e| WireError::Decompression(e.to_string()))?;
            debug!(compressed = data.len(), decompressed = out.len(), "lz4 payload");
            Ok((Cow::Owned(out), false))
        },
        c if FOREIGN_CANARIES.contains(&c) => Err(WireError::UnsupportedCompression(char::from(c))),
        _ => Ok((Cow::Borrowed(data), true)),
    }
}
