//! Wire records of the relay REST API.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use p2p_eval_core::{MultiAddress, epoch_nanos};
use serde::{Deserialize, Serialize};

/// Response of `GET /info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub listen_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enr_uri: Option<String>,
}

impl NodeInfo {
    /// First advertised address other containers can dial.
    pub fn routable_address(&self) -> Option<MultiAddress> {
        MultiAddress::select_routable(self.listen_addresses.iter().map(String::as_str))
    }
}

/// A relay message, as published and as returned from the message buffer.
///
/// `payload` and `meta` are base64 on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakuMessage {
    pub payload: String,
    pub content_topic: String,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

impl WakuMessage {
    /// Build an ephemeral message stamped with the current time.
    pub fn new(payload: impl AsRef<[u8]>, content_topic: impl Into<String>) -> Self {
        Self {
            payload: BASE64.encode(payload),
            content_topic: content_topic.into(),
            timestamp: epoch_nanos(),
            ephemeral: true,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: impl AsRef<[u8]>) -> Self {
        self.meta = Some(BASE64.encode(meta));
        self
    }

    pub fn with_ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Decoded payload bytes, if the payload is valid base64.
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        BASE64.decode(&self.payload).ok()
    }
}
