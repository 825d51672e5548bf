//! Wire messages exchanged with the push server
//!
//! Outbound frames are built from [`ClientMessage`]; inbound frames are parsed
//! into [`ServerMessage`], which keeps the raw JSON object so that handlers
//! can pull out only the fields they need.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::ProtocolError;

/// The only `status` value that counts as success
pub const STATUS_OK: i64 = 200;

/// One `{channelID, version}` pair as carried by `ack` and `notification`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "channelID")]
    pub channel_id: String,
    pub version: u64,
}

/// A frame the client sends
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Hello { uaid: String },
    Register { channel_id: String, uaid: String },
    Unregister { channel_id: String },
    Ack { updates: Vec<Update> },
    /// Heartbeat, sent as an empty object
    Ping,
    /// Arbitrary JSON, used by the fuzzer
    Raw(Value),
}

impl ClientMessage {
    /// Build an `ack` for a single channel
    pub fn ack(channel_id: impl Into<String>, version: u64) -> Self {
        ClientMessage::Ack {
            updates: vec![Update {
                channel_id: channel_id.into(),
                version,
            }],
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::Register { .. } => "register",
            ClientMessage::Unregister { .. } => "unregister",
            ClientMessage::Ack { .. } => "ack",
            ClientMessage::Ping => "ping",
            ClientMessage::Raw(_) => "raw",
        }
    }

    /// JSON representation as sent on the wire
    pub fn to_json(&self) -> Value {
        match self {
            ClientMessage::Hello { uaid } => json!({
                "messageType": "hello",
                "channelIDs": [],
                "uaid": uaid,
            }),
            ClientMessage::Register { channel_id, uaid } => json!({
                "messageType": "register",
                "channelID": channel_id,
                "uaid": uaid,
            }),
            ClientMessage::Unregister { channel_id } => json!({
                "messageType": "unregister",
                "channelID": channel_id,
            }),
            ClientMessage::Ack { updates } => json!({
                "messageType": "ack",
                "updates": updates,
            }),
            ClientMessage::Ping => json!({}),
            ClientMessage::Raw(value) => value.clone(),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// The `messageType` of an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Hello,
    Register,
    Unregister,
    Ack,
    Ping,
    Notification,
    Other(String),
}

impl MessageType {
    fn from_value(value: &Value) -> Self {
        match value.as_str() {
            Some("hello") => MessageType::Hello,
            Some("register") => MessageType::Register,
            Some("unregister") => MessageType::Unregister,
            Some("ack") => MessageType::Ack,
            Some("ping") => MessageType::Ping,
            Some("notification") => MessageType::Notification,
            Some(other) => MessageType::Other(other.to_string()),
            None => MessageType::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Hello => "hello",
            MessageType::Register => "register",
            MessageType::Unregister => "unregister",
            MessageType::Ack => "ack",
            MessageType::Ping => "ping",
            MessageType::Notification => "notification",
            MessageType::Other(name) => name,
        }
    }
}

/// A parsed frame received from the server
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// `None` when the frame carries no `messageType` at all
    pub message_type: Option<MessageType>,
    body: Map<String, Value>,
}

impl ServerMessage {
    /// Parse a text frame. Anything but a JSON object is malformed.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Malformed(format!("invalid JSON: {}", e)))?;

        match value {
            Value::Object(body) => Ok(Self {
                message_type: body.get("messageType").map(MessageType::from_value),
                body,
            }),
            other => Err(ProtocolError::Malformed(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    /// Fail unless `status` is absent or exactly the integer 200
    pub fn check_status(&self) -> Result<(), ProtocolError> {
        match self.body.get("status") {
            None => Ok(()),
            Some(status) if status.as_i64() == Some(STATUS_OK) => Ok(()),
            Some(status) => Err(ProtocolError::Status(status.to_string())),
        }
    }

    /// Name of the message type for logs and errors
    pub fn type_name(&self) -> &str {
        self.message_type
            .as_ref()
            .map(MessageType::as_str)
            .unwrap_or("<none>")
    }

    /// The `pushEndpoint` of a register response
    pub fn push_endpoint(&self) -> Result<&str, ProtocolError> {
        self.body
            .get("pushEndpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField {
                field: "pushEndpoint",
                message_type: self.type_name().to_string(),
            })
    }

    /// The `channelID` field, if it is a string
    pub fn channel_id(&self) -> Option<&str> {
        self.body.get("channelID").and_then(Value::as_str)
    }

    /// Well-formed entries of the `updates` list; malformed ones are skipped
    pub fn updates(&self) -> Vec<Update> {
        self.body
            .get("updates")
            .and_then(Value::as_array)
            .map(|updates| {
                updates
                    .iter()
                    .filter_map(|u| serde_json::from_value(u.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw access to any other field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}
