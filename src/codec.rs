//! Wire codec for backend messages
//!
//! Outbound control signals are JSON text frames with a `type` discriminator;
//! outbound audio is an unframed binary blob. Inbound frames are transcription
//! units carrying both language texts.

use serde::{Deserialize, Serialize};

/// One complete captured or selected audio source, sent as a single binary
/// message. No chunk framing.
pub type AudioPayload = Vec<u8>;

/// Control signals sent to the backend as text frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Ask the backend to begin ingesting live audio from its capture source
    StartCapture,
}

/// One completed transcription unit from the backend
///
/// Both fields are required; a message missing either is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResult {
    /// Source-language text of the utterance
    pub primary_text: String,
    /// Target-language text of the utterance
    pub secondary_text: String,
}

/// A backend message that failed structured parsing
///
/// Carries a bounded fragment of the raw input for diagnostics. Decode
/// failures never affect connection state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed transcription message: {detail} (raw: {raw:?})")]
pub struct DecodeError {
    /// Leading fragment of the undecodable input
    pub raw: String,
    /// Parser diagnostic
    pub detail: String,
}

/// Longest raw fragment retained in a [`DecodeError`]
const RAW_FRAGMENT_CHARS: usize = 256;

/// Serialize a control message for a text frame
pub fn encode_control(msg: &ControlMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Pass audio bytes through unchanged; one message carries the whole payload
#[inline]
pub fn encode_audio(payload: AudioPayload) -> Vec<u8> {
    payload
}

/// Parse one inbound text frame into a transcription unit
pub fn decode(raw: &str) -> Result<TranscriptionResult, DecodeError> {
    serde_json::from_str(raw).map_err(|e| DecodeError {
        raw: raw.chars().take(RAW_FRAGMENT_CHARS).collect(),
        detail: e.to_string(),
    })
}
