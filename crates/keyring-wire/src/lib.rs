//! Keyring Wire
//!
//! Plumbing shared with the rest of a cluster: a canary-framed compression
//! codec and the envelope used to forward a client request from one node
//! to another. Neither touches key material.
//!
//! ```text
//! request ──capture──► ForwardedRequest ──encode(VAULT_MESSAGE_TYPE)──► bytes
//!                                                                        │
//! request ◄─into_parts── ForwardedRequest ◄──────────decode──────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod compression;
mod error;
pub mod forwarding;

pub use compression::{CompressionType, compress, decompress};
pub use error::WireError;
pub use forwarding::{
    ForwardedRequest, ForwardedUrl, ForwardingConfig, HeaderEntry, MESSAGE_TYPE_ENV, MessageType,
    RequestParts,
};
