/// Wire contract shared by the notify gateway and its consumers
///
/// Every frame in either direction is one JSON object:
/// `{ "type": string, "data": <any>, "id"?: string, "timestamp"?: number }`.
/// The gateway fills `id` and `timestamp` for notification envelopes; control
/// frames (WELCOME, ping, pong) usually carry neither.
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Message type tag for the server-side handshake frame.
pub const TYPE_WELCOME: &str = "WELCOME";

/// Message type tags for the keepalive contract.
pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";

/// One wire frame. `kind` serializes as `type`; payload semantics are opaque
/// to both the gateway's delivery path and the connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Unix epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WireMessage {
    /// Create a notification frame for a delivered envelope
    pub fn notification(kind: impl Into<String>, data: serde_json::Value, id: String) -> Self {
        WireMessage {
            kind: kind.into(),
            data,
            id: Some(id),
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Create the handshake frame sent when a connection opens
    pub fn welcome(client_id: &str) -> Self {
        WireMessage {
            kind: TYPE_WELCOME.to_string(),
            data: serde_json::json!({ "client_id": client_id }),
            id: None,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Create a keepalive ping frame
    pub fn ping() -> Self {
        WireMessage {
            kind: TYPE_PING.to_string(),
            data: serde_json::Value::Null,
            id: None,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Create a keepalive pong frame
    pub fn pong() -> Self {
        WireMessage {
            kind: TYPE_PONG.to_string(),
            data: serde_json::Value::Null,
            id: None,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Whether this frame belongs to the keepalive contract rather than the
    /// notification stream
    pub fn is_keepalive(&self) -> bool {
        self.kind == TYPE_PING || self.kind == TYPE_PONG
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
