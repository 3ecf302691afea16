//! Derived status views for the UI
//!
//! A pure mapping from (connection state, mode, last error) to the text,
//! severity, and control visibility the UI should show. Views are derived on
//! every change and never stored.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::error::BridgeError;
use crate::mode::Mode;

/// How prominently the status text should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
}

/// UI elements whose visibility is state-driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlId {
    /// "Start listening" button
    CaptureButton,
    /// Audio input device selector
    DeviceSelector,
    /// "Upload audio" button
    UploadButton,
    /// Audio file picker
    FilePicker,
    /// Busy indicator shown while capturing or processing
    ListeningIndicator,
}

/// One derived snapshot of what the UI should display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub text: String,
    pub severity: Severity,
    pub visible_controls: Vec<ControlId>,
}

/// Map bridge state to a status view
///
/// Exhaustive over the full (connection, mode) cross-product; every
/// combination yields a distinct text. A present error takes over text and
/// severity while control visibility still follows the mode.
pub fn report(
    connection: ConnectionState,
    mode: Mode,
    last_error: Option<&BridgeError>,
) -> StatusView {
    let visible_controls = controls_for(mode);

    if let Some(err) = last_error {
        return StatusView {
            text: err.to_string(),
            severity: Severity::Error,
            visible_controls,
        };
    }

    let (text, severity) = match (connection, mode) {
        (ConnectionState::Disconnected, Mode::Idle) => (
            "Disconnected from backend. Retrying shortly.",
            Severity::Error,
        ),
        (ConnectionState::Disconnected, Mode::LiveCapture) => (
            "Disconnected during live capture. Retrying shortly.",
            Severity::Error,
        ),
        (ConnectionState::Disconnected, Mode::Uploading) => (
            "Disconnected while processing upload. Retrying shortly.",
            Severity::Error,
        ),
        (ConnectionState::Connecting, Mode::Idle) => {
            ("Connecting to backend...", Severity::Info)
        }
        (ConnectionState::Connecting, Mode::LiveCapture) => (
            "Connecting to backend to start live capture...",
            Severity::Info,
        ),
        (ConnectionState::Connecting, Mode::Uploading) => (
            "Connecting to backend to send audio...",
            Severity::Info,
        ),
        (ConnectionState::Connected, Mode::Idle) => (
            "Connected to backend. Ready for live audio or file upload.",
            Severity::Info,
        ),
        (ConnectionState::Connected, Mode::LiveCapture) => {
            ("Listening for live audio...", Severity::Info)
        }
        (ConnectionState::Connected, Mode::Uploading) => {
            ("Audio sent. Waiting for transcription...", Severity::Info)
        }
        (ConnectionState::Errored, Mode::Idle) => (
            "Connection error. Check the backend server.",
            Severity::Error,
        ),
        (ConnectionState::Errored, Mode::LiveCapture) => (
            "Connection error interrupted live capture.",
            Severity::Error,
        ),
        (ConnectionState::Errored, Mode::Uploading) => (
            "Connection error interrupted the upload.",
            Severity::Error,
        ),
    };

    StatusView {
        text: text.to_string(),
        severity,
        visible_controls,
    }
}

/// Control visibility per mode: live and upload controls are mutually
/// exclusive outside Idle
fn controls_for(mode: Mode) -> Vec<ControlId> {
    match mode {
        Mode::Idle => vec![
            ControlId::CaptureButton,
            ControlId::DeviceSelector,
            ControlId::UploadButton,
            ControlId::FilePicker,
        ],
        Mode::LiveCapture => vec![
            ControlId::CaptureButton,
            ControlId::DeviceSelector,
            ControlId::ListeningIndicator,
        ],
        Mode::Uploading => vec![
            ControlId::UploadButton,
            ControlId::FilePicker,
            ControlId::ListeningIndicator,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const CONNECTION_STATES: [ConnectionState; 4] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Errored,
    ];

    const MODES: [Mode; 3] = [Mode::Idle, Mode::LiveCapture, Mode::Uploading];

    #[test]
    fn test_cross_product_is_defined_and_distinct() {
        let mut texts = HashSet::new();
        for connection in CONNECTION_STATES {
            for mode in MODES {
                let view = report(connection, mode, None);
                assert!(
                    !view.text.is_empty(),
                    "empty status for ({connection}, {mode})"
                );
                assert!(
                    !view.visible_controls.is_empty(),
                    "no controls for ({connection}, {mode})"
                );
                assert!(
                    texts.insert(view.text.clone()),
                    "duplicate status text {:?} for ({connection}, {mode})",
                    view.text
                );
            }
        }
        assert_eq!(texts.len(), CONNECTION_STATES.len() * MODES.len());
    }

    #[test]
    fn test_connected_and_disconnected_idle_views_differ() {
        let connected = report(ConnectionState::Connected, Mode::Idle, None);
        let disconnected = report(ConnectionState::Disconnected, Mode::Idle, None);
        assert_ne!(connected, disconnected);
        assert_eq!(connected.severity, Severity::Info);
        assert_eq!(disconnected.severity, Severity::Error);
    }

    #[test]
    fn test_idle_shows_both_control_groups() {
        let view = report(ConnectionState::Connected, Mode::Idle, None);
        assert!(view.visible_controls.contains(&ControlId::CaptureButton));
        assert!(view.visible_controls.contains(&ControlId::UploadButton));
    }

    #[test]
    fn test_modes_hide_the_opposite_controls() {
        let live = report(ConnectionState::Connected, Mode::LiveCapture, None);
        assert!(!live.visible_controls.contains(&ControlId::UploadButton));
        assert!(!live.visible_controls.contains(&ControlId::FilePicker));
        assert!(live
            .visible_controls
            .contains(&ControlId::ListeningIndicator));

        let uploading = report(ConnectionState::Connected, Mode::Uploading, None);
        assert!(!uploading.visible_controls.contains(&ControlId::CaptureButton));
        assert!(!uploading.visible_controls.contains(&ControlId::DeviceSelector));
    }

    #[test]
    fn test_error_overrides_text_and_severity() {
        let err = BridgeError::NoFileSelected;
        let view = report(ConnectionState::Connected, Mode::Idle, Some(&err));
        assert_eq!(view.text, "no audio file selected");
        assert_eq!(view.severity, Severity::Error);
        // Visibility still follows the mode
        assert!(view.visible_controls.contains(&ControlId::UploadButton));
    }
}
