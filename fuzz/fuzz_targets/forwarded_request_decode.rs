//! Fuzz target for forwarded request decoding
//!
//! # Strategy
//!
//! - Raw: arbitrary bytes under every message type
//! - Compressed: arbitrary bytes behind the LZ4 canary, including lying
//!   size prefixes
//! - Bounded: a real request captured with an arbitrary size limit
//!
//! # Invariants
//!
//! - Decoding never panics
//! - Captured requests survive every message type unchanged

#![no_main]

use arbitrary::Arbitrary;
use keyring_wire::{
    ForwardedRequest, ForwardingConfig, MessageType, RequestParts, compression::CANARY_LZ4,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(Vec<u8>),
    Compressed { claimed_size: u32, block: Vec<u8> },
    Bounded { method: String, body: Vec<u8>, limit: u16 },
}

const TYPES: [MessageType; 3] = [MessageType::Json, MessageType::JsonCompress, MessageType::Proto3];

fuzz_target!(|input: Input| {
    match input {
        Input::Raw(bytes) => {
            for message_type in TYPES {
                let _ = ForwardedRequest::decode(&bytes, message_type);
            }
        },
        Input::Compressed { claimed_size, block } => {
            let mut bytes = vec![CANARY_LZ4];
            bytes.extend_from_slice(&claimed_size.to_le_bytes());
            bytes.extend_from_slice(&block);
            let _ = ForwardedRequest::decode(&bytes, MessageType::JsonCompress);
        },
        Input::Bounded { method, body, limit } => {
            let parts = RequestParts { method, ..RequestParts::default() };
            let config = ForwardingConfig { max_request_size: Some(u64::from(limit)), ..Default::default() };
            let Ok(request) = ForwardedRequest::capture(parts, body.as_slice(), &config) else {
                return;
            };

            for message_type in TYPES {
                let Ok(encoded) = request.encode(message_type) else {
                    continue;
                };
                let decoded = ForwardedRequest::decode(&encoded, message_type);
                assert_eq!(decoded.as_ref(), Ok(&request), "{message_type:?}");
            }
        },
    }
});
