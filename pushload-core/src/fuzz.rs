//! Malformed traffic for the fuzz behavior

use serde_json::json;

use crate::message::ClientMessage;

/// The burst a fuzz client sends on open and after every inbound message.
///
/// Mixes well-formed frames sent out of order with frames whose fields have
/// the wrong types or whose shape the protocol does not know.
pub fn fuzz_burst(uaid: &str, channel_id: &str, version: u64) -> Vec<ClientMessage> {
    vec![
        ClientMessage::Register {
            channel_id: channel_id.to_string(),
            uaid: uaid.to_string(),
        },
        ClientMessage::Ping,
        ClientMessage::Unregister {
            channel_id: channel_id.to_string(),
        },
        ClientMessage::Hello {
            uaid: uaid.to_string(),
        },
        ClientMessage::ack(channel_id, version),
        ClientMessage::Hello {
            uaid: uaid.to_string(),
        },
        ClientMessage::Raw(json!({
            "messageType": "register",
            "channelID": true,
            "uaid": false,
        })),
        ClientMessage::Raw(json!({
            "messageType": "garbage",
            "channelIDs": [{"channelID": true, "version": 23}],
            "uaid": 123,
        })),
        ClientMessage::Raw(json!({"foo": 123})),
        ClientMessage::Ping,
    ]
}
