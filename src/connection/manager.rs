//! Connection lifecycle state machine
//!
//! Owns the single backend transport. Transitions happen only on transport
//! events or an explicit connect command:
//!
//! Disconnected -> Connecting -> Connected -> Disconnected -> Connecting ...
//!
//! with Connected -> Errored -> Disconnected (forced close) as the only error
//! detour. Every close schedules exactly one reconnect attempt after a fixed
//! delay; the pending attempt lives in a single slot, so duplicate concurrent
//! attempts cannot exist. There is no terminal state: the manager runs until
//! it receives a shutdown command or its command channel closes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::codec::{self, AudioPayload, ControlMessage};
use crate::events::BridgeEvent;

use super::transport::{ConnectionError, Connector, Frame, Transport};

/// Lifecycle state of the single backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport; nothing pending unless a reconnect timer is armed
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// The transport is open; sends are legal
    Connected,
    /// The transport failed; a forced close follows immediately
    Errored,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Errored => write!(f, "Errored"),
        }
    }
}

/// Commands accepted by the manager task
///
/// These are the only operations other components may perform on the
/// connection; the raw transport never leaves this module.
#[derive(Debug)]
pub enum Command {
    /// Establish the transport unless one is already connecting or connected
    Connect,
    /// Send a control signal as a text frame
    SendControl(ControlMessage),
    /// Send one complete audio payload as a binary frame
    SendAudio(AudioPayload),
    /// Close the transport, cancel any pending reconnect, and exit
    Shutdown,
}

/// The connection manager task
pub struct ConnectionManager<C: Connector> {
    state: ConnectionState,
    connector: C,
    event_tx: broadcast::Sender<BridgeEvent>,
    reconnect_delay: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        event_tx: broadcast::Sender<BridgeEvent>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connector,
            event_tx,
            reconnect_delay,
        }
    }

    /// Run the manager, processing commands, inbound frames, and the
    /// reconnect timer until shutdown
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<Command>) {
        let mut transport: Option<C::Transport> = None;
        let mut reconnect_at: Option<Instant> = None;

        info!("connection manager started in Disconnected state");

        loop {
            let pending = reconnect_at;
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(Command::Connect) => {
                            self.open(&mut transport, &mut reconnect_at).await;
                        }
                        Some(Command::SendControl(msg)) => {
                            match codec::encode_control(&msg) {
                                Ok(text) => {
                                    self.send(Frame::Text(text), &mut transport, &mut reconnect_at)
                                        .await;
                                }
                                Err(e) => warn!(error = %e, "control message encoding failed"),
                            }
                        }
                        Some(Command::SendAudio(payload)) => {
                            let bytes = codec::encode_audio(payload);
                            self.send(Frame::Binary(bytes), &mut transport, &mut reconnect_at)
                                .await;
                        }
                        Some(Command::Shutdown) | None => {
                            if let Some(mut t) = transport.take() {
                                t.close().await;
                            }
                            break;
                        }
                    }
                }
                frame = next_frame(&mut transport) => {
                    self.handle_frame(frame, &mut transport, &mut reconnect_at).await;
                }
                _ = wait_until(pending) => {
                    reconnect_at = None;
                    debug!("reconnect delay elapsed");
                    self.open(&mut transport, &mut reconnect_at).await;
                }
            }
        }

        info!("connection manager stopped");
    }

    /// Establish the transport; a no-op while Connecting or Connected
    async fn open(
        &mut self,
        transport: &mut Option<C::Transport>,
        reconnect_at: &mut Option<Instant>,
    ) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = %self.state, "connect ignored, transport already live");
            return;
        }

        self.set_state(ConnectionState::Connecting);
        self.emit(BridgeEvent::Connecting);

        match self.connector.connect().await {
            Ok(t) => {
                *transport = Some(t);
                // A user-driven connect supersedes any pending retry
                *reconnect_at = None;
                self.set_state(ConnectionState::Connected);
                self.emit(BridgeEvent::Connected);
            }
            Err(e) => {
                warn!(error = %e, "connection attempt failed");
                self.set_state(ConnectionState::Disconnected);
                let retry_in_ms = self.schedule_reconnect(reconnect_at);
                self.emit(BridgeEvent::ConnectFailed {
                    detail: e.to_string(),
                    retry_in_ms,
                });
            }
        }
    }

    /// Write one frame; rejected without a transport write unless Connected
    async fn send(
        &mut self,
        frame: Frame,
        transport: &mut Option<C::Transport>,
        reconnect_at: &mut Option<Instant>,
    ) {
        if self.state != ConnectionState::Connected {
            warn!(state = %self.state, "send rejected outside Connected state");
            self.emit(BridgeEvent::SendRejected);
            return;
        }
        let Some(t) = transport.as_mut() else {
            warn!("send rejected, transport slot empty");
            self.emit(BridgeEvent::SendRejected);
            return;
        };
        if let Err(e) = t.send(frame).await {
            self.transport_error(e, transport, reconnect_at).await;
        }
    }

    /// Route one inbound transport item
    async fn handle_frame(
        &mut self,
        frame: Option<Result<Frame, ConnectionError>>,
        transport: &mut Option<C::Transport>,
        reconnect_at: &mut Option<Instant>,
    ) {
        match frame {
            Some(Ok(Frame::Text(text))) => match codec::decode(&text) {
                Ok(result) => {
                    debug!("transcription unit received");
                    self.emit(BridgeEvent::Transcription(result));
                }
                Err(e) => {
                    // The connection stays usable after a bad message
                    warn!(error = %e, "inbound message decode failed");
                    self.emit(BridgeEvent::DecodeFailed {
                        raw: e.raw,
                        detail: e.detail,
                    });
                }
            },
            Some(Ok(Frame::Binary(bytes))) => {
                debug!(len = bytes.len(), "ignoring binary frame from backend");
            }
            Some(Ok(Frame::Close(close))) => {
                let (code, reason) = match close {
                    Some((code, reason)) => (Some(code), Some(reason)),
                    None => (None, None),
                };
                self.closed(code, reason, transport, reconnect_at);
            }
            Some(Err(e)) => self.transport_error(e, transport, reconnect_at).await,
            None => self.closed(None, None, transport, reconnect_at),
        }
    }

    /// Close path: drop the transport, announce, arm one reconnect
    fn closed(
        &mut self,
        code: Option<u16>,
        reason: Option<String>,
        transport: &mut Option<C::Transport>,
        reconnect_at: &mut Option<Instant>,
    ) {
        *transport = None;
        self.set_state(ConnectionState::Disconnected);
        let retry_in_ms = self.schedule_reconnect(reconnect_at);
        info!(?code, ?reason, retry_in_ms, "connection closed, reconnect pending");
        self.emit(BridgeEvent::Disconnected {
            code,
            reason,
            retry_in_ms,
        });
    }

    /// Error path: announce, force the transport closed, then run the close
    /// path so exactly one reconnect is scheduled
    async fn transport_error(
        &mut self,
        err: ConnectionError,
        transport: &mut Option<C::Transport>,
        reconnect_at: &mut Option<Instant>,
    ) {
        error!(error = %err, "transport error, forcing close");
        self.set_state(ConnectionState::Errored);
        self.emit(BridgeEvent::TransportError {
            detail: err.to_string(),
        });
        if let Some(mut t) = transport.take() {
            t.close().await;
        }
        self.closed(None, None, transport, reconnect_at);
    }

    /// Arm the single reconnect slot; returns the delay in milliseconds
    fn schedule_reconnect(&self, reconnect_at: &mut Option<Instant>) -> u64 {
        *reconnect_at = Some(Instant::now() + self.reconnect_delay);
        self.reconnect_delay.as_millis() as u64
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if new_state != self.state {
            info!(from = %self.state, to = %new_state, "connection state transition");
            self.state = new_state;
        }
    }

    fn emit(&self, event: BridgeEvent) {
        debug!(%event, "emitting connection event");
        let _ = self.event_tx.send(event);
    }
}

/// Next inbound item, or never while no transport is live
async fn next_frame<T: Transport>(
    transport: &mut Option<T>,
) -> Option<Result<Frame, ConnectionError>> {
    match transport.as_mut() {
        Some(t) => t.next().await,
        None => std::future::pending().await,
    }
}

/// Completion of the pending reconnect delay, or never while none is armed
async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
