//! Big-integer radix-62 codec.
//!
//! Bytes are read as one unsigned big-endian integer and written with the
//! digits `0-9A-Za-z`. Leading zero bytes do not survive a round trip; the
//! encrypted path segments this is used for never start with one.

use num_bigint::BigUint;

use crate::CryptoError;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn digit_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'Z' => Some(c - b'A' + 10),
        b'a'..=b'z' => Some(c - b'a' + 36),
        _ => None,
    }
}

/// Render `bytes` in base62. Empty input renders as `"0"`.
pub fn encode(bytes: &[u8]) -> String {
    BigUint::from_bytes_be(bytes)
        .to_radix_be(62)
        .into_iter()
        .map(|d| char::from(ALPHABET[d as usize]))
        .collect()
}

/// Parse base62 text back into big-endian bytes. `"0"` decodes to empty.
///
/// # Errors
///
/// `InvalidBase62` for empty input or any character outside the alphabet.
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    if text.is_empty() {
        return Err(CryptoError::InvalidBase62);
    }

    let digits = text
        .bytes()
        .map(digit_value)
        .collect::<Option<Vec<u8>>>()
        .ok_or(CryptoError::InvalidBase62)?;

    let value = BigUint::from_radix_be(&digits, 62).ok_or(CryptoError::InvalidBase62)?;
    if value.bits() == 0 {
        return Ok(Vec::new());
    }
    Ok(value.to_bytes_be())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(encode(&[]), "0");
        assert_eq!(encode(&[61]), "z");
        assert_eq!(encode(&[62]), "10");
        assert_eq!(encode(&[0x01, 0x00]), "48");
        assert_eq!(decode("z").unwrap(), vec![61]);
        assert_eq!(decode("0").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn roundtrips_envelope_text() {
        let text = b"vault:v1:AAECAwQFBgcICQoLDA0ODxAREhM=";
        let encoded = encode(text);
        assert!(encoded.bytes().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(decode(&encoded).unwrap(), text);
    }

    #[test]
    fn rejects_foreign_characters() {
        assert_eq!(decode(""), Err(CryptoError::InvalidBase62));
        assert_eq!(decode("abc/"), Err(CryptoError::InvalidBase62));
        assert_eq!(decode("ab-c"), Err(CryptoError::InvalidBase62));
    }
}
