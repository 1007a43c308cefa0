//! Forwarded request envelope.
//!
//! A request received by one node is captured into a [`ForwardedRequest`],
//! encoded in the configured [`MessageType`] and replayed by another node.

use std::{collections::BTreeMap, io::Read};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    WireError,
    compression::{self, CompressionType},
};

/// Environment variable selecting the message type.
pub const MESSAGE_TYPE_ENV: &str = "VAULT_MESSAGE_TYPE";

/// Encoding of forwarded requests on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageType {
    /// Plain JSON
    Json,
    /// JSON behind the compression canary
    JsonCompress,
    /// Compact binary encoding
    #[default]
    Proto3,
}

impl MessageType {
    /// Message type named by `name`; unknown or missing names select
    /// [`MessageType::Proto3`].
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("json") => Self::Json,
            Some("json_compress") => Self::JsonCompress,
            _ => Self::Proto3,
        }
    }

    /// Message type from `VAULT_MESSAGE_TYPE`.
    pub fn from_env() -> Self {
        Self::from_name(std::env::var(MESSAGE_TYPE_ENV).ok().as_deref())
    }

    /// Name accepted by [`from_name`](Self::from_name).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonCompress => "json_compress",
            Self::Proto3 => "proto3",
        }
    }
}

/// Forwarding settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardingConfig {
    /// Wire encoding
    pub message_type: MessageType,
    /// Upper bound on the captured body; `None` or 0 reads it all
    pub max_request_size: Option<u64>,
}

impl ForwardingConfig {
    /// Config with the message type taken from the environment.
    pub fn from_env() -> Self {
        Self { message_type: MessageType::from_env(), max_request_size: None }
    }
}

/// Parsed request URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedUrl {
    /// e.g. `https`
    #[serde(default)]
    pub scheme: String,
    /// Opaque data for non-hierarchical URLs
    #[serde(default)]
    pub opaque: String,
    /// `host` or `host:port`
    #[serde(default)]
    pub host: String,
    /// Decoded path
    #[serde(default)]
    pub path: String,
    /// Encoded path, when it differs from the default encoding of `path`
    #[serde(default)]
    pub raw_path: String,
    /// Query without the `?`
    #[serde(default)]
    pub raw_query: String,
    /// Fragment without the `#`
    #[serde(default)]
    pub fragment: String,
}

impl ForwardedUrl {
    /// Render as `scheme://host/path?query#fragment`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.scheme.is_empty() {
            out.push_str(&self.scheme);
            out.push(':');
        }
        if !self.opaque.is_empty() {
            out.push_str(&self.opaque);
        } else {
            if !self.host.is_empty() {
                out.push_str("//");
                out.push_str(&self.host);
            }
            out.push_str(if self.raw_path.is_empty() { &self.path } else { &self.raw_path });
        }
        if !self.raw_query.is_empty() {
            out.push('?');
            out.push_str(&self.raw_query);
        }
        if !self.fragment.is_empty() {
            out.push('#');
            out.push_str(&self.fragment);
        }
        out
    }
}

/// All values of one header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Values in arrival order
    #[serde(default)]
    pub values: Vec<String>,
}

/// Request metadata captured alongside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    /// HTTP method
    pub method: String,
    /// Target URL
    pub url: ForwardedUrl,
    /// Header name to values
    pub headers: BTreeMap<String, Vec<String>>,
    /// `Host` the client addressed
    pub host: String,
    /// Client address
    pub remote_addr: String,
    /// DER certificates presented by the client, leaf first
    pub peer_certificates: Vec<Vec<u8>>,
}

/// An HTTP request in transit between nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedRequest {
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Target URL
    #[serde(default)]
    pub url: Option<ForwardedUrl>,
    /// Headers by name
    #[serde(default)]
    pub header_entries: BTreeMap<String, HeaderEntry>,
    /// Request body
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
    /// `Host` the client addressed
    #[serde(default)]
    pub host: String,
    /// Client address
    #[serde(default)]
    pub remote_addr: String,
    /// DER certificates presented by the client, leaf first
    #[serde(default, with = "base64_list")]
    pub peer_certificates: Vec<Vec<u8>>,
}

impl ForwardedRequest {
    /// Capture `parts` and the body read from `body`.
    ///
    /// A positive `config.max_request_size` stops the copy after that many
    /// bytes; the rest of the body is left unread.
    pub fn capture<R: Read>(
        parts: RequestParts,
        mut body: R,
        config: &ForwardingConfig,
    ) -> Result<Self, WireError> {
        let mut buf = Vec::new();
        let read = match config.max_request_size {
            Some(max) if max > 0 => body.take(max).read_to_end(&mut buf),
            _ => body.read_to_end(&mut buf),
        };
        read.map_err(|e| WireError::Io(e.to_string()))?;

        let header_entries = parts
            .headers
            .into_iter()
            .map(|(name, values)| (name, HeaderEntry { values }))
            .collect();

        Ok(Self {
            method: parts.method,
            url: Some(parts.url),
            header_entries,
            body: buf,
            host: parts.host,
            remote_addr: parts.remote_addr,
            peer_certificates: parts.peer_certificates,
        })
    }

    /// Split back into metadata and body.
    pub fn into_parts(self) -> (RequestParts, Vec<u8>) {
        let headers = self.header_entries.into_iter().map(|(name, entry)| (name, entry.values)).collect();
        let parts = RequestParts {
            method: self.method,
            url: self.url.unwrap_or_default(),
            headers,
            host: self.host,
            remote_addr: self.remote_addr,
            peer_certificates: self.peer_certificates,
        };
        (parts, self.body)
    }

    /// Encode for the wire.
    pub fn encode(&self, message_type: MessageType) -> Result<Vec<u8>, WireError> {
        let out = match message_type {
            MessageType::Json => serde_json::to_vec(self)?,
            MessageType::JsonCompress => compression::compress(&serde_json::to_vec(self)?, CompressionType::Lz4),
            MessageType::Proto3 => {
                let mut out = Vec::new();
                ciborium::ser::into_writer(self, &mut out).map_err(|e| WireError::Binary(e.to_string()))?;
                out
            },
        };
        debug!(message_type = message_type.as_str(), len = out.len(), "encoded forwarded request");
        Ok(out)
    }

    /// Decode from the wire. Both JSON types accept compressed and plain
    /// input.
    pub fn decode(data: &[u8], message_type: MessageType) -> Result<Self, WireError> {
        if data.is_empty() {
            return Err(WireError::Empty("forwarded request"));
        }

        match message_type {
            MessageType::Json | MessageType::JsonCompress => {
                let (json, _) = compression::decompress(data)?;
                Ok(serde_json::from_slice(&json)?)
            },
            MessageType::Proto3 => {
                ciborium::de::from_reader(data).map_err(|e| WireError::Binary(e.to_string()))
            },
        }
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

mod base64_list {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    pub(super) fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Option::<Vec<String>>::deserialize(deserializer)?
            .unwrap_or_default()
            .into_iter()
            .map(|item| STANDARD.decode(item).map_err(D::Error::custom))
            .collect()
    }
}
