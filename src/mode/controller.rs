//! Mode state machine
//!
//! Orchestrates user intent against the connection manager: entering live
//! capture sends the start signal once the connection is up, uploading pushes
//! one complete payload, and reset re-enables both controls. Modes are
//! mutually exclusive; the UI derives control visibility from the current
//! mode.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::codec::{AudioPayload, ControlMessage};
use crate::connection::{Command, ConnectionState};
use crate::error::BridgeError;
use crate::events::BridgeEvent;

/// The three user-facing modes of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Neither capture nor upload is active; both controls are available
    Idle,
    /// The backend is ingesting live audio from its capture source
    LiveCapture,
    /// One pre-recorded payload has been sent for transcription
    Uploading,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "Idle"),
            Mode::LiveCapture => write!(f, "LiveCapture"),
            Mode::Uploading => write!(f, "Uploading"),
        }
    }
}

/// User intents arriving from the UI control surface
#[derive(Debug)]
pub enum Intent {
    /// Begin live capture
    StartLiveCapture,
    /// Transcribe one complete pre-recorded payload
    Upload(AudioPayload),
    /// Return to Idle, re-enabling both controls
    Reset,
}

/// Drives mode transitions and connection commands from user intent
pub struct ModeController {
    mode: Mode,
    /// Connection state as last announced by the manager
    conn_state: ConnectionState,
    /// A start signal is owed as soon as the connection comes up.
    /// At most one per LiveCapture entry.
    start_pending: bool,
    command_tx: mpsc::Sender<Command>,
}

impl ModeController {
    pub fn new(command_tx: mpsc::Sender<Command>) -> Self {
        Self {
            mode: Mode::Idle,
            conn_state: ConnectionState::Disconnected,
            start_pending: false,
            command_tx,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn_state
    }

    /// Enter live capture; the start signal goes out now if the connection is
    /// up, otherwise as soon as it comes up
    pub async fn request_live_capture(&mut self) -> Result<(), BridgeError> {
        self.set_mode(Mode::LiveCapture);
        if self.conn_state == ConnectionState::Connected {
            self.send_command(Command::SendControl(ControlMessage::StartCapture))
                .await;
        } else {
            self.start_pending = true;
            self.send_command(Command::Connect).await;
        }
        Ok(())
    }

    /// Send one complete payload for transcription
    ///
    /// A missing or empty payload is rejected before mode or connection are
    /// touched. Without a live connection the upload fails, a connect attempt
    /// is triggered, and mode returns to Idle.
    pub async fn request_upload(
        &mut self,
        payload: Option<AudioPayload>,
    ) -> Result<(), BridgeError> {
        let payload = match payload {
            Some(p) if !p.is_empty() => p,
            _ => return Err(BridgeError::NoFileSelected),
        };

        self.set_mode(Mode::Uploading);
        if self.conn_state == ConnectionState::Connected {
            self.send_command(Command::SendAudio(payload)).await;
            Ok(())
        } else {
            warn!("upload rejected, backend not connected");
            self.send_command(Command::Connect).await;
            self.set_mode(Mode::Idle);
            Err(BridgeError::NotConnected)
        }
    }

    /// Return to Idle and drop any owed start signal
    pub fn reset(&mut self) {
        self.set_mode(Mode::Idle);
        self.start_pending = false;
    }

    /// Track the manager's announcements and flush the owed start signal on
    /// the Connected transition
    pub async fn handle_event(&mut self, event: &BridgeEvent) {
        match event {
            BridgeEvent::Connecting => self.conn_state = ConnectionState::Connecting,
            BridgeEvent::Connected => {
                self.conn_state = ConnectionState::Connected;
                if self.start_pending {
                    self.start_pending = false;
                    self.send_command(Command::SendControl(ControlMessage::StartCapture))
                        .await;
                }
            }
            BridgeEvent::Disconnected { .. } | BridgeEvent::ConnectFailed { .. } => {
                self.conn_state = ConnectionState::Disconnected;
            }
            BridgeEvent::TransportError { .. } => {
                self.conn_state = ConnectionState::Errored;
            }
            BridgeEvent::SendRejected
            | BridgeEvent::Transcription(_)
            | BridgeEvent::DecodeFailed { .. } => {}
        }
    }

    fn set_mode(&mut self, new_mode: Mode) {
        if new_mode != self.mode {
            info!(from = %self.mode, to = %new_mode, "mode transition");
            self.mode = new_mode;
        }
    }

    async fn send_command(&self, command: Command) {
        if self.command_tx.send(command).await.is_err() {
            warn!("connection manager command channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_controller() -> (ModeController, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(8);
        (ModeController::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Command>) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            commands.push(cmd);
        }
        commands
    }

    #[tokio::test]
    async fn test_initial_mode() {
        let (controller, _rx) = create_controller();
        assert_eq!(controller.mode(), Mode::Idle);
        assert_eq!(
            controller.connection_state(),
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_upload_without_payload_is_rejected() {
        let (mut controller, mut rx) = create_controller();

        let err = controller.request_upload(None).await.unwrap_err();
        assert_eq!(err, BridgeError::NoFileSelected);
        assert_eq!(controller.mode(), Mode::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_upload_with_empty_payload_is_rejected() {
        let (mut controller, mut rx) = create_controller();

        let err = controller.request_upload(Some(Vec::new())).await.unwrap_err();
        assert_eq!(err, BridgeError::NoFileSelected);
        assert_eq!(controller.mode(), Mode::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_upload_while_connected_sends_payload() {
        let (mut controller, mut rx) = create_controller();
        controller.handle_event(&BridgeEvent::Connected).await;

        controller.request_upload(Some(vec![9, 9])).await.unwrap();
        assert_eq!(controller.mode(), Mode::Uploading);

        let commands = drain(&mut rx);
        assert!(matches!(commands.as_slice(), [Command::SendAudio(p)] if p == &vec![9, 9]));
    }

    #[tokio::test]
    async fn test_upload_while_disconnected_reverts_to_idle() {
        let (mut controller, mut rx) = create_controller();

        let err = controller.request_upload(Some(vec![1])).await.unwrap_err();
        assert_eq!(err, BridgeError::NotConnected);
        assert_eq!(controller.mode(), Mode::Idle);

        // A connect attempt was triggered, but nothing was sent
        let commands = drain(&mut rx);
        assert!(matches!(commands.as_slice(), [Command::Connect]));
    }

    #[tokio::test]
    async fn test_live_capture_while_connected_sends_start_once() {
        let (mut controller, mut rx) = create_controller();
        controller.handle_event(&BridgeEvent::Connected).await;

        controller.request_live_capture().await.unwrap();
        assert_eq!(controller.mode(), Mode::LiveCapture);

        let commands = drain(&mut rx);
        assert!(matches!(
            commands.as_slice(),
            [Command::SendControl(ControlMessage::StartCapture)]
        ));
    }

    #[tokio::test]
    async fn test_repeated_live_capture_intent_sends_at_most_one_more() {
        let (mut controller, mut rx) = create_controller();
        controller.handle_event(&BridgeEvent::Connected).await;

        controller.request_live_capture().await.unwrap();
        controller.request_live_capture().await.unwrap();

        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|c| matches!(c, Command::SendControl(ControlMessage::StartCapture))));
    }

    #[tokio::test]
    async fn test_live_capture_while_disconnected_defers_start() {
        let (mut controller, mut rx) = create_controller();

        controller.request_live_capture().await.unwrap();
        assert_eq!(controller.mode(), Mode::LiveCapture);
        let commands = drain(&mut rx);
        assert!(matches!(commands.as_slice(), [Command::Connect]));

        // Repeated intent while disconnected still owes only one start
        controller.request_live_capture().await.unwrap();
        drain(&mut rx);

        controller.handle_event(&BridgeEvent::Connected).await;
        let commands = drain(&mut rx);
        assert!(matches!(
            commands.as_slice(),
            [Command::SendControl(ControlMessage::StartCapture)]
        ));

        // A second Connected transition owes nothing
        controller.handle_event(&BridgeEvent::Connected).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle_and_drops_owed_start() {
        let (mut controller, mut rx) = create_controller();

        controller.request_live_capture().await.unwrap();
        controller.reset();
        assert_eq!(controller.mode(), Mode::Idle);
        drain(&mut rx);

        controller.handle_event(&BridgeEvent::Connected).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_tracks_announced_connection_state() {
        let (mut controller, _rx) = create_controller();

        controller.handle_event(&BridgeEvent::Connecting).await;
        assert_eq!(controller.connection_state(), ConnectionState::Connecting);

        controller.handle_event(&BridgeEvent::Connected).await;
        assert_eq!(controller.connection_state(), ConnectionState::Connected);

        controller
            .handle_event(&BridgeEvent::TransportError {
                detail: "reset".into(),
            })
            .await;
        assert_eq!(controller.connection_state(), ConnectionState::Errored);

        controller
            .handle_event(&BridgeEvent::Disconnected {
                code: None,
                reason: None,
                retry_in_ms: 3000,
            })
            .await;
        assert_eq!(
            controller.connection_state(),
            ConnectionState::Disconnected
        );
    }
}
