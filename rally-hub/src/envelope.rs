// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire frames and broker payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rally_model::UserId;

/// The frame exchanged with WebSocket clients, in both directions.
///
/// Serialized as compact JSON (`{"type":…,"payload":…}`), UTF-8, no whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type, e.g. `chat.message` or `task.reordered`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// The message carried by the broker between a publisher and the subscribed connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Constant discriminator, kept on the wire for cross-process transports.
    #[serde(rename = "type")]
    pub kind: String,
    /// The envelope type emitted to clients.
    pub message_type: String,
    /// The envelope payload emitted to clients.
    pub payload: Value,
    /// The user that caused the message; used for self-echo suppression of typing events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
}

impl BroadcastMessage {
    /// Creates a broadcast message.
    pub fn new(message_type: impl Into<String>, payload: Value, sender_id: Option<UserId>) -> Self {
        Self {
            kind: "broadcast".to_string(),
            message_type: message_type.into(),
            payload,
            sender_id,
        }
    }

    /// Converts the broker message into the client-facing envelope.
    pub fn into_envelope(self) -> Envelope {
        Envelope {
            kind: self.message_type,
            payload: self.payload,
        }
    }
}
