//! Fuzz target for `Envelope::parse`
//!
//! Arbitrary text must either parse into a version and payload or be
//! rejected with a reason. Parsed envelopes must survive rendering.

#![no_main]

use keyring_crypto::{Envelope, envelope};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(parsed) = Envelope::parse(text) {
        assert!(parsed.version >= 1, "version 0 is read as 1");
        let rendered = envelope::render_encoded(parsed.version, parsed.payload);
        assert_eq!(Envelope::parse(&rendered), Ok(parsed));
        let _ = parsed.decode_payload();
    }
});
