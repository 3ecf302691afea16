//! Events broadcast by the connection manager
//!
//! The manager owns the transport and announces everything that happens on it
//! as typed events; the mode controller and the status pipeline subscribe and
//! derive their own views. Nothing outside the manager mutates connection
//! state.

use serde::{Deserialize, Serialize};

use crate::codec::TranscriptionResult;

/// Connection and message events emitted by the connection manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A connection attempt has started
    Connecting,

    /// The transport is open; sends are now legal
    Connected,

    /// The transport closed; one reconnect is pending
    Disconnected {
        /// Close code from the peer, when one was delivered
        code: Option<u16>,
        /// Close reason from the peer, when one was delivered
        reason: Option<String>,
        /// Delay before the pending reconnect attempt
        retry_in_ms: u64,
    },

    /// A connection attempt failed to open; one retry is pending
    ConnectFailed { detail: String, retry_in_ms: u64 },

    /// The transport errored; a forced close follows
    TransportError { detail: String },

    /// A send was attempted outside the Connected state
    SendRejected,

    /// One decoded transcription unit
    Transcription(TranscriptionResult),

    /// An inbound message failed decoding; the connection stays up
    DecodeFailed { raw: String, detail: String },
}

impl std::fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeEvent::Connecting => write!(f, "CONNECTING"),
            BridgeEvent::Connected => write!(f, "CONNECTED"),
            BridgeEvent::Disconnected { retry_in_ms, .. } => {
                write!(f, "DISCONNECTED (retry in {}ms)", retry_in_ms)
            }
            BridgeEvent::ConnectFailed { retry_in_ms, .. } => {
                write!(f, "CONNECT_FAILED (retry in {}ms)", retry_in_ms)
            }
            BridgeEvent::TransportError { detail } => {
                write!(f, "TRANSPORT_ERROR ({})", detail)
            }
            BridgeEvent::SendRejected => write!(f, "SEND_REJECTED"),
            BridgeEvent::Transcription(_) => write!(f, "TRANSCRIPTION"),
            BridgeEvent::DecodeFailed { .. } => write!(f, "DECODE_FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = BridgeEvent::Disconnected {
            code: Some(1006),
            reason: None,
            retry_in_ms: 3000,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("disconnected"));
        assert!(json.contains("3000"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"connected"}"#;
        let event: BridgeEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, BridgeEvent::Connected));
    }

    #[test]
    fn test_transcription_event_carries_wire_fields() {
        let event = BridgeEvent::Transcription(TranscriptionResult {
            primary_text: "नमस्ते".into(),
            secondary_text: "hello".into(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("primaryText"));
        assert!(json.contains("secondaryText"));
    }
}
