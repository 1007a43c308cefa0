//! Key derivation: counter-mode over a PRF, and HKDF-SHA256.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

/// Output length of [`hmac_sha256_prf`] in bits.
pub const HMAC_SHA256_PRF_LEN: u32 = 256;

/// HMAC-SHA256 as a PRF: `prf(key, data)`.
pub fn hmac_sha256_prf(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Counter-mode KDF (NIST SP 800-108 style).
///
/// Each round feeds `BE32(i) || context || BE32(bits)` to `prf` under `key`;
/// the outputs are concatenated and truncated to `bits / 8` bytes.
///
/// # Errors
///
/// - `InvalidBitLength` if `prf_len` or `bits` is zero or not a multiple of 8
/// - `ShortOutput` if the PRF returns less than it advertised
/// - whatever the PRF itself returns
pub fn counter_mode<F>(
    prf: F,
    prf_len: u32,
    key: &[u8],
    context: &[u8],
    bits: u32,
) -> Result<Vec<u8>, CryptoError>
where
    F: Fn(&[u8], &[u8]) -> Result<Vec<u8>, CryptoError>,
{
    if prf_len == 0 || prf_len % 8 != 0 {
        return Err(CryptoError::InvalidBitLength { what: "prf length", bits: prf_len });
    }
    if bits % 8 != 0 {
        return Err(CryptoError::InvalidBitLength { what: "output length", bits });
    }

    let rounds = bits.div_ceil(prf_len);
    let wanted = (bits / 8) as usize;

    let mut input = Vec::with_capacity(8 + context.len());
    input.extend_from_slice(&[0u8; 4]);
    input.extend_from_slice(context);
    input.extend_from_slice(&bits.to_be_bytes());

    let mut out = Vec::with_capacity(rounds as usize * (prf_len / 8) as usize);
    for i in 0..rounds {
        input[..4].copy_from_slice(&i.to_be_bytes());
        out.extend_from_slice(&prf(key, &input)?);
    }

    if out.len() < wanted {
        return Err(CryptoError::ShortOutput { expected: wanted, got: out.len() });
    }
    out.truncate(wanted);
    Ok(out)
}

/// HKDF-SHA256 with no salt and `info = context`, read to exactly `len`
/// bytes.
///
/// # Errors
///
/// `ShortOutput` if `len` exceeds what HKDF-SHA256 can produce (8160 bytes).
pub fn hkdf_sha256(key: &[u8], context: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, key);
    let mut out = vec![0u8; len];
    hkdf.expand(context, &mut out)
        .map_err(|_| CryptoError::ShortOutput { expected: len, got: 0 })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_mode_rejects_partial_bytes() {
        let err = counter_mode(hmac_sha256_prf, 255, b"k", b"c", 256).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidBitLength { what: "prf length", .. }));

        let err = counter_mode(hmac_sha256_prf, 256, b"k", b"c", 12).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidBitLength { what: "output length", .. }));
    }

    #[test]
    fn counter_mode_single_round_matches_manual_prf() {
        let key = [7u8; 32];
        let out = counter_mode(hmac_sha256_prf, HMAC_SHA256_PRF_LEN, &key, b"ctx", 256).unwrap();

        let mut input = vec![0, 0, 0, 0];
        input.extend_from_slice(b"ctx");
        input.extend_from_slice(&256u32.to_be_bytes());
        assert_eq!(out, hmac_sha256_prf(&key, &input).unwrap());
    }

    #[test]
    fn counter_mode_truncates_last_round() {
        let key = [1u8; 32];
        let long = counter_mode(hmac_sha256_prf, 256, &key, b"ctx", 384).unwrap();
        assert_eq!(long.len(), 48);

        // Second round uses counter 1 with the same trailing length
        let mut input = vec![0, 0, 0, 1];
        input.extend_from_slice(b"ctx");
        input.extend_from_slice(&384u32.to_be_bytes());
        let second = hmac_sha256_prf(&key, &input).unwrap();
        assert_eq!(&long[32..], &second[..16]);
    }

    #[test]
    fn counter_mode_length_is_bound_into_output() {
        let key = [1u8; 32];
        let short = counter_mode(hmac_sha256_prf, 256, &key, b"ctx", 128).unwrap();
        let long = counter_mode(hmac_sha256_prf, 256, &key, b"ctx", 256).unwrap();
        assert_ne!(short[..], long[..16]);
    }

    #[test]
    fn counter_mode_zero_bits_is_empty() {
        let out = counter_mode(hmac_sha256_prf, 256, b"k", b"c", 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn counter_mode_detects_short_prf() {
        let short_prf = |_: &[u8], _: &[u8]| Ok(vec![0u8; 4]);
        let err = counter_mode(short_prf, 256, b"k", b"c", 256).unwrap_err();
        assert_eq!(err, CryptoError::ShortOutput { expected: 32, got: 4 });
    }

    #[test]
    fn hkdf_depends_on_context() {
        let a = hkdf_sha256(&[9u8; 32], b"one", 32).unwrap();
        let b = hkdf_sha256(&[9u8; 32], b"two", 32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_eq!(a, hkdf_sha256(&[9u8; 32], b"one", 32).unwrap());
    }

    #[test]
    fn hkdf_refuses_oversized_reads() {
        assert!(hkdf_sha256(b"k", b"c", 255 * 32 + 1).is_err());
    }
}
