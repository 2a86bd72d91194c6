//! Protocol envelope
//!
//! Every frame on the wire is one JSON object:
//! `{"type": "...", "data": ..., "messageId": "...", "timestamp": 0}`.
//! Only `type` is required. Servers stamp `timestamp` as integer or
//! fractional epoch milliseconds; both are accepted and truncated.

use crate::error::{Result, TetherError};
use crate::traits::WsMessage;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Typed message unit exchanged over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(
        rename = "messageId",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_message_id"
    )]
    pub message_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<i64>,
}

/// Any JSON number; other shapes read as absent
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|ms| ms as i64))))
}

/// String or numeric ids; other shapes read as absent
fn lenient_message_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

/// Inbound envelope types the supervisor interprets itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    Connected,
    Authenticated,
    AuthError,
    Ping,
    Pong,
    ConnectionRetry,
    MaxRetriesReached,
    IdleTimeout,
    RoomJoined,
    RoomLeft,
    MessageSent,
    Error,
    ErrorHandled,
    /// Application-defined type
    Application,
}

impl InboundKind {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "connected" => Self::Connected,
            "authenticated" => Self::Authenticated,
            "auth_error" => Self::AuthError,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "connection_retry" => Self::ConnectionRetry,
            "max_retries_reached" => Self::MaxRetriesReached,
            "idle_timeout" => Self::IdleTimeout,
            "room_joined" => Self::RoomJoined,
            "room_left" => Self::RoomLeft,
            "message_sent" => Self::MessageSent,
            "error" => Self::Error,
            "error_handled" => Self::ErrorHandled,
            _ => Self::Application,
        }
    }

    /// Protocol types are consumed by the supervisor even with no handler
    pub fn is_protocol(self) -> bool {
        !matches!(self, Self::Application)
    }
}

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            message_id: None,
            timestamp: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn inbound_kind(&self) -> InboundKind {
        InboundKind::from_type(&self.kind)
    }

    /// String field of `data`
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Unsigned integer field of `data`
    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.as_ref()?.get(key)?.as_u64()
    }

    /// Human-readable message carried by `auth_error` / `error` envelopes
    ///
    /// Accepts `{"message": "..."}`, `{"error": "..."}` or a bare string.
    pub fn error_message(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        if let Some(text) = data.as_str() {
            return Some(text.to_string());
        }
        data.get("message")
            .or_else(|| data.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Parse a frame into an envelope
    pub fn parse(message: &WsMessage) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(message.as_bytes())?;
        if envelope.kind.is_empty() {
            return Err(TetherError::Protocol("envelope type is empty".into()));
        }
        Ok(envelope)
    }

    /// Encode as a text frame
    pub fn to_frame(&self) -> Result<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?))
    }

    // ---------------------------------------------------------------------
    // Outbound constructors
    // ---------------------------------------------------------------------

    pub fn authenticate(token: &str) -> Self {
        Self::new("authenticate").with_data(json!({ "token": token }))
    }

    pub fn ping(timestamp_ms: i64) -> Self {
        Self::new("ping").with_data(json!({ "timestamp": timestamp_ms }))
    }

    /// Echo reply to a server `ping`
    pub fn pong(echo: Option<Value>) -> Self {
        Self::new("pong").with_data(json!({ "echo": echo.unwrap_or(Value::Null) }))
    }

    pub fn join_room(room_id: &str) -> Self {
        Self::new("join_room").with_data(json!({ "roomId": room_id }))
    }

    pub fn leave_room(room_id: &str) -> Self {
        Self::new("leave_room").with_data(json!({ "roomId": room_id }))
    }

    /// Room-scoped application message with a generated `messageId`
    pub fn room_message(room_id: &str, message: Value) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::new("send_message")
            .with_data(json!({ "roomId": room_id, "message": message }))
            .with_message_id(format!("{}-{}", now, seq))
            .with_timestamp(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_envelope() {
        let env = Envelope::parse(&WsMessage::Text(r#"{"type":"connected"}"#.into())).unwrap();
        assert_eq!(env.kind, "connected");
        assert_eq!(env.inbound_kind(), InboundKind::Connected);
        assert!(env.data.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Envelope::parse(&WsMessage::Text("not json".into())).is_err());
        assert!(Envelope::parse(&WsMessage::Text(r#"{"data":1}"#.into())).is_err());
        assert!(Envelope::parse(&WsMessage::Text(r#"{"type":""}"#.into())).is_err());
    }

    #[test]
    fn test_fractional_timestamp_is_accepted() {
        let frame = WsMessage::Text(
            r#"{"type":"authenticated","timestamp":1700000000000.5,"messageId":42}"#.into(),
        );
        let env = Envelope::parse(&frame).unwrap();
        assert_eq!(env.inbound_kind(), InboundKind::Authenticated);
        assert_eq!(env.timestamp, Some(1_700_000_000_000));
        assert_eq!(env.message_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_odd_timestamp_shapes_read_as_absent() {
        for raw in [
            r#"{"type":"chat","timestamp":"2024-01-01T00:00:00Z"}"#,
            r#"{"type":"chat","timestamp":null}"#,
            r#"{"type":"chat","timestamp":{"ms":1}}"#,
        ] {
            let env = Envelope::parse(&WsMessage::Text(raw.into())).unwrap();
            assert_eq!(env.kind, "chat");
            assert_eq!(env.timestamp, None);
        }
    }

    #[test]
    fn test_binary_frames_are_parsed_as_json() {
        let frame = WsMessage::Binary(br#"{"type":"pong","data":{"echo":1}}"#.to_vec());
        assert_eq!(Envelope::parse(&frame).unwrap().kind, "pong");
    }

    #[test]
    fn test_authenticate_wire_format() {
        let frame = Envelope::authenticate("abc123").to_frame().unwrap();
        let value: Value = serde_json::from_str(frame.as_text().unwrap()).unwrap();
        assert_eq!(value["type"], "authenticate");
        assert_eq!(value["data"]["token"], "abc123");
        assert!(value.get("messageId").is_none());
    }

    #[test]
    fn test_error_message_shapes() {
        let a = Envelope::new("auth_error").with_data(json!({"message": "invalid token"}));
        let b = Envelope::new("error").with_data(json!("boom"));
        let c = Envelope::new("error").with_data(json!({"error": "nope"}));
        let d = Envelope::new("error");
        assert_eq!(a.error_message().as_deref(), Some("invalid token"));
        assert_eq!(b.error_message().as_deref(), Some("boom"));
        assert_eq!(c.error_message().as_deref(), Some("nope"));
        assert_eq!(d.error_message(), None);
    }

    #[test]
    fn test_room_message_ids_are_unique() {
        let a = Envelope::room_message("lobby", json!("hi"));
        let b = Envelope::room_message("lobby", json!("hi"));
        assert_eq!(a.data_str("roomId"), Some("lobby"));
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn test_unknown_type_is_application() {
        assert_eq!(InboundKind::from_type("chat"), InboundKind::Application);
        assert!(!InboundKind::Application.is_protocol());
        assert!(InboundKind::RoomJoined.is_protocol());
    }
}
