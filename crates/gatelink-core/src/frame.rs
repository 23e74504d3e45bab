//! Gateway wire frames.
//!
//! Every message on the socket is one JSON text frame, discriminated by its
//! `"type"` field: `req`, `res` or `event`. Anything that does not decode into
//! one of the three known tags is dropped at the read boundary rather than
//! trusted deeper into the call chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON-encoded message unit on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// A request issued by this client: `{"type":"req",...}`.
    Req(RequestFrame),
    /// A correlated response from the gateway: `{"type":"res",...}`.
    Res(ResponseFrame),
    /// An unsolicited event from the gateway: `{"type":"event",...}`.
    Event(EventFrame),
}

impl Frame {
    /// Decode a raw text frame, returning `None` for anything malformed or
    /// unknown. Tolerates protocol additions from newer gateways.
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(err) => {
                tracing::debug!(error = %err, "dropping undecodable frame");
                None
            }
        }
    }

    /// Encode to the JSON text representation sent on the socket.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outbound RPC request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestFrame {
    /// Build a request with a fresh UUID v4 id.
    ///
    /// Ids must be unique for the lifetime of a connection; random 128-bit
    /// ids satisfy that without any per-connection counter state.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Inbound response frame, matched to a request by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl ResponseFrame {
    /// Unwrap the payload or surface the remote error.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        if self.ok {
            Ok(self.payload.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| RemoteError {
                code: "UNKNOWN".into(),
                message: "gateway returned ok:false without an error object".into(),
                details: None,
            }))
        }
    }
}

/// Error object carried by an `ok:false` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Unsolicited event frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "stateVersion")]
    pub state_version: Option<Value>,
}

impl EventFrame {
    /// Extract the session key this event is addressed to, if any.
    ///
    /// Gateway events scope themselves via `payload.sessionKey` (chat/agent
    /// streams) or `payload.key` (session bookkeeping events). Events with
    /// neither are broadcast-style and unroutable per session.
    pub fn session_key(&self) -> Option<&str> {
        self.payload
            .get("sessionKey")
            .or_else(|| self.payload.get("key"))
            .and_then(Value::as_str)
    }
}
