//! Wire-format frames: inbound parsing and server-originated messages.
//!
//! Inbound frames are decoded into a raw `serde_json::Map` so relayed
//! payloads (offers, answers, ICE candidates) pass through byte-for-byte
//! modulo key order. The broker only reads `type` and `to`.

use serde::Serialize;
use serde_json::{Map, Value};

/// Root keys rejected on any inbound frame (property-shadowing guard).
const RESERVED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Stable machine-readable strings carried by `error` frames.
pub mod reason {
    pub const INVALID_MESSAGE: &str = "invalid-message";
    pub const INVALID_ROOM_NAME: &str = "invalid-room-name";
    pub const ROOM_FULL: &str = "room-full";
    pub const RATE_LIMIT: &str = "rate-limit";
    pub const TARGET_UNAVAILABLE: &str = "target-unavailable-or-different-room";
}

/// Outcome of parsing one inbound text frame.
#[derive(Debug)]
pub enum Parsed {
    /// A well-formed control frame.
    Frame(InboundFrame),
    /// Not JSON at all. Roomed senders fall through to a raw broadcast.
    NonJson,
    /// JSON, but violating the frame rules.
    Invalid,
}

/// A decoded inbound frame. `fields` holds the complete root object so the
/// dispatcher can forward it untouched.
#[derive(Debug)]
pub struct InboundFrame {
    pub kind: String,
    pub to: Option<String>,
    pub fields: Map<String, Value>,
}

/// Decode one inbound text frame.
///
/// Rejected as `Invalid`: non-object roots, reserved property-shadowing
/// keys, a missing or non-string `type`, and a non-string `to`.
pub fn parse(text: &str) -> Parsed {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Parsed::NonJson,
    };
    let map = match value {
        Value::Object(m) => m,
        _ => return Parsed::Invalid,
    };
    if RESERVED_KEYS.iter().any(|k| map.contains_key(*k)) {
        return Parsed::Invalid;
    }
    let kind = match map.get("type") {
        Some(Value::String(s)) => s.clone(),
        _ => return Parsed::Invalid,
    };
    let to = match map.get("to") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Parsed::Invalid,
    };
    Parsed::Frame(InboundFrame { kind, to, fields: map })
}

/// Re-serialize an inbound frame with the sender's id stamped as `from`.
/// All other fields are preserved.
pub fn relay_json(mut fields: Map<String, Value>, from: &str) -> String {
    fields.insert("from".to_string(), Value::String(from.to_string()));
    serde_json::to_string(&Value::Object(fields)).unwrap()
}

/// Server → client frames, emitted as compact JSON with a `type` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "id")]
    Id { id: String },
    #[serde(rename = "room-joined")]
    RoomJoined { room: String },
    #[serde(rename = "room-left")]
    RoomLeft { room: String },
    #[serde(rename = "room-peers")]
    RoomPeers { peers: Vec<String> },
    #[serde(rename = "peer-joined")]
    PeerJoined {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    #[serde(rename = "peer-left")]
    PeerLeft {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    #[serde(rename = "error")]
    Error {
        message: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}
