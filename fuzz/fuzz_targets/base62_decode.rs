//! Fuzz target for the base62 codec
//!
//! Decoding must never panic, and any byte string without leading zeros
//! must survive encode then decode.

#![no_main]

use keyring_crypto::base62;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = base62::decode(text);
    }

    if data.first().is_some_and(|b| *b != 0) {
        let encoded = base62::encode(data);
        assert_eq!(base62::decode(&encoded).ok().as_deref(), Some(data));
    }
});
