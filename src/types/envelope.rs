//! Wire envelope: `{ "type", "data", "timestamp" }`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::ConnectionStatus;
use crate::error::EnvelopeError;

/// Reserved kind for connection status events
pub const CONNECTION_KIND: &str = "connection";
/// Reserved wildcard kind, receives every inbound data envelope
pub const MESSAGE_KIND: &str = "message";
/// Outbound heartbeat kind
pub const PING_KIND: &str = "ping";
/// Server reply to a heartbeat
pub const PONG_KIND: &str = "pong";

/// A typed, timestamped message crossing the transport boundary
///
/// Immutable once constructed; handlers receive it by reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(rename = "data", default, skip_serializing_if = "Value::is_null")]
    payload: Value,

    /// Receipt time when the sender omitted it
    #[serde(default = "Utc::now", with = "crate::utils::time::iso8601")]
    timestamp: DateTime<Utc>,

    /// Top-level fields beyond the three above (e.g. `predictions`)
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope stamped with the current time
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self::at(kind, payload, Utc::now())
    }

    /// Create an envelope with an explicit timestamp
    pub fn at(kind: impl Into<String>, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp,
            extra: Map::new(),
        }
    }

    /// Outbound heartbeat frame
    pub fn ping() -> Self {
        Self::new(PING_KIND, Value::Null)
    }

    /// Connection status event for the reserved `connection` kind
    pub fn connection(status: ConnectionStatus) -> Self {
        Self::new(CONNECTION_KIND, json!({ "status": status }))
    }

    /// Add a top-level field next to `type`, `data` and `timestamp`
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Parse a text frame
    pub fn parse(frame: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Serialize to a text frame
    pub fn to_frame(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Whether the kind is reserved for client-side dispatch
    pub fn is_reserved(&self) -> bool {
        matches!(self.kind.as_str(), CONNECTION_KIND | MESSAGE_KIND)
    }

    /// Status carried by a `connection` event
    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        if self.kind != CONNECTION_KIND {
            return None;
        }
        self.payload
            .get("status")
            .and_then(|status| serde_json::from_value(status.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_iso8601;

    #[test]
    fn test_parse_wire_frame() {
        let frame = r#"{"type":"space_weather_update","data":{"kp_index":4.0},"timestamp":"2024-05-10T12:00:00Z"}"#;
        let envelope = Envelope::parse(frame).unwrap();

        assert_eq!(envelope.kind(), "space_weather_update");
        assert_eq!(envelope.payload()["kp_index"], 4.0);
        assert_eq!(envelope.timestamp(), parse_iso8601("2024-05-10T12:00:00Z").unwrap());
    }

    #[test]
    fn test_parse_keeps_extra_fields() {
        let frame = r#"{"type":"space_weather_update","data":{},"predictions":{"composite":{"score":42}},"timestamp":"2024-05-10T12:00:00.5"}"#;
        let envelope = Envelope::parse(frame).unwrap();

        assert_eq!(envelope.extra()["predictions"]["composite"]["score"], 42);
        let reencoded = envelope.to_frame().unwrap();
        assert!(reencoded.contains("\"predictions\""));
    }

    #[test]
    fn test_missing_timestamp_uses_receipt_time() {
        let before = Utc::now();
        let envelope = Envelope::parse(r#"{"type":"pong"}"#).unwrap();
        assert!(envelope.timestamp() >= before);
        assert!(envelope.payload().is_null());
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(Envelope::parse("not json").is_err());
        assert!(Envelope::parse(r#"{"data":{}}"#).is_err());
        assert!(Envelope::parse(r#"{"type":"ping","timestamp":"soon"}"#).is_err());
    }

    #[test]
    fn test_ping_frame_shape() {
        let inbound = Envelope::parse(r#"{"type":"alert","data":{"id":"a1"},"timestamp":"2024-05-10T16:00:00Z"}"#).unwrap();
        assert_eq!(inbound.kind(), "alert");

        let frame = Envelope::ping().to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value.get("data").is_none());

        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(parse_iso8601(timestamp).is_some());
        assert!(timestamp.ends_with('Z'));
    }

    #[test]
    fn test_connection_event() {
        let envelope = Envelope::connection(ConnectionStatus::Disconnected);
        assert!(envelope.is_reserved());
        assert_eq!(envelope.payload()["status"], "disconnected");
        assert_eq!(envelope.connection_status(), Some(ConnectionStatus::Disconnected));

        assert_eq!(Envelope::ping().connection_status(), None);
    }
}
