//! Fuzz target for stored policy records
//!
//! Storage may hand back anything. Decoding must fail cleanly, and a
//! decoded policy that passes its invariant check must encode again.

#![no_main]

use keyring_core::Policy;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(policy) = Policy::deserialize(data) else {
        return;
    };

    if policy.check_invariants().is_ok() {
        let encoded = policy.serialize().ok();
        assert!(encoded.is_some(), "valid policy failed to encode");
    }
});
