//! Relay control messages

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{Envelope, PONG_KIND};

/// Reply kind for a `reconnect` request
pub const RECONNECT_ACK_KIND: &str = "reconnect_ack";
/// Kind of relay-side error frames
pub const ERROR_KIND: &str = "error";

/// Messages a stream client may send to the relay
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat
    Ping,
    /// Reconnection request on an already open stream
    Reconnect,
    /// Anything else; accepted and ignored
    #[serde(other)]
    Other,
}

/// Heartbeat reply
pub fn pong() -> Envelope {
    Envelope::new(PONG_KIND, Value::Null)
}

pub fn reconnect_ack() -> Envelope {
    Envelope::new(RECONNECT_ACK_KIND, Value::Null).with_field("message", json!("Already connected"))
}

/// Sent to a client whose receiver fell behind the broadcast buffer
pub fn lagged(missed: u64) -> Envelope {
    Envelope::new(
        ERROR_KIND,
        json!({
            "code": "lagged",
            "missed": missed,
            "message": format!("Missed {missed} updates"),
        }),
    )
}
