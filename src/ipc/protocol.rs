//! Control-surface message protocol
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! The capture UI drives the bridge with requests and, once subscribed,
//! receives every status change and transcription unit as a push
//! notification.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::TranscriptionResult;
use crate::connection::ConnectionState;
use crate::error::BridgeError;
use crate::mode::Mode;
use crate::status::StatusView;

/// Requests from the capture UI to the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request the current bridge status snapshot
    GetStatus,

    /// Begin live capture
    StartLiveCapture,

    /// Transcribe the audio file at `path`
    UploadAudio { path: PathBuf },

    /// List available audio input devices
    ListDevices,

    /// Return to Idle, re-enabling both controls
    Reset,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to status and transcription notifications
    Subscribe,
}

/// Responses from the bridge to the capture UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current bridge status
    Status(BridgeStatus),

    /// Available audio input devices; empty when none are present
    Devices {
        inputs: Vec<String>,
        default: Option<String>,
    },

    /// The intent was queued; its outcome arrives as notifications
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The derived status view changed
    Status(StatusView),

    /// One decoded transcription unit
    Transcription(TranscriptionResult),
}

/// Full bridge status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge version
    pub version: String,

    /// Connection lifecycle state
    pub connection: ConnectionState,

    /// Current mode
    pub mode: Mode,

    /// Derived view for the UI
    pub view: StatusView,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for BridgeStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            connection: ConnectionState::default(),
            mode: Mode::default(),
            view: crate::status::report(ConnectionState::default(), Mode::default(), None),
            uptime_secs: 0,
        }
    }
}

impl Response {
    /// Map a bridge error onto the wire error shape
    pub fn from_error(err: &BridgeError) -> Self {
        let code = match err {
            BridgeError::Connection(_) => "connection_error",
            BridgeError::Decode(_) => "decode_error",
            BridgeError::NotConnected => "not_connected",
            BridgeError::NoFileSelected => "no_file_selected",
            BridgeError::PermissionDenied(_) => "permission_denied",
        };
        Response::Error {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}
