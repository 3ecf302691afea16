//! subtitle-bridge: client bridge between a capture UI and a streaming
//! transcription backend
//!
//! The bridge provides:
//! - A single owned WebSocket connection to the backend with idempotent
//!   reconnection
//! - Dual-mode outbound messaging: control signals (live capture) and raw
//!   audio payloads (file upload)
//! - Decoding of inbound transcription results
//! - A Unix-socket control surface keeping the capture UI synchronized with
//!   connection and mode state
//!
//! Speech recognition itself, audio capture internals, and rendering are
//! external collaborators; the bridge only moves bytes and state between
//! them.

mod capture;
mod codec;
mod config;
mod connection;
mod error;
mod events;
mod ipc;
mod lifecycle;
mod mode;
mod status;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::codec::DecodeError;
use crate::config::Config;
use crate::connection::{Command, ConnectionError, ConnectionManager, WsConnector};
use crate::error::BridgeError;
use crate::events::BridgeEvent;
use crate::ipc::{Notification, Server};
use crate::mode::{Intent, ModeController};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "subtitle-bridge starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        backend_url = %config.backend_url,
        socket_path = ?config.socket_path,
        "configuration loaded"
    );

    // Create channels for inter-component communication
    // Mode controller / drive loop -> connection manager
    let (command_tx, command_rx) = mpsc::channel(32);
    // Connection manager -> subscribers
    let (event_tx, _event_rx) = broadcast::channel::<BridgeEvent>(64);
    // Control surface -> drive loop
    let (intent_tx, intent_rx) = mpsc::channel(32);
    // Drive loop -> subscribed UI clients
    let (notify_tx, _notify_rx) = broadcast::channel::<Notification>(64);

    // Create the connection manager owning the backend transport
    let manager = ConnectionManager::new(
        WsConnector::new(config.backend_url.clone()),
        event_tx.clone(),
        config.reconnect_delay,
    );

    // Create the mode controller
    let controller = ModeController::new(command_tx.clone());

    // Create the control surface for the capture UI
    let server = Server::new(&config.socket_path, intent_tx, notify_tx.clone())?;

    // Dial the backend once at startup; later connects stay idempotent
    command_tx.send(Command::Connect).await?;

    let event_rx = event_tx.subscribe();

    info!("bridge initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the connection manager (owns the transport)
        _ = manager.run(command_rx) => {
            info!("connection manager exited");
        }

        // Run the control surface (accepts UI connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "control surface error");
            }
        }

        // Apply UI intents and connection events, publishing derived status
        _ = drive(controller, intent_rx, event_rx, notify_tx, &server) => {
            info!("drive loop exited");
        }

        // Wait for shutdown signal
        _ = lifecycle::shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("subtitle-bridge stopped");

    Ok(())
}

/// React to UI intents and connection events, keeping the status snapshot
/// and subscribed clients synchronized
async fn drive(
    mut controller: ModeController,
    mut intent_rx: mpsc::Receiver<Intent>,
    mut event_rx: broadcast::Receiver<BridgeEvent>,
    notify_tx: broadcast::Sender<Notification>,
    server: &Server,
) {
    let mut last_error: Option<BridgeError> = None;

    loop {
        tokio::select! {
            intent = intent_rx.recv() => {
                let Some(intent) = intent else { break };
                last_error = match apply_intent(&mut controller, intent).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(error = %e, "intent rejected");
                        Some(e)
                    }
                };
                publish_status(&controller, last_error.as_ref(), &notify_tx, server).await;
            }

            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        controller.handle_event(&event).await;
                        match &event {
                            // Every transition overwrites the previous status,
                            // as each transport callback did in the UI
                            BridgeEvent::Connecting
                            | BridgeEvent::Connected
                            | BridgeEvent::Disconnected { .. } => {
                                last_error = None;
                            }
                            BridgeEvent::ConnectFailed { detail, .. } => {
                                last_error = Some(BridgeError::Connection(
                                    ConnectionError::OpenFailed(detail.clone()),
                                ));
                            }
                            BridgeEvent::TransportError { detail } => {
                                last_error = Some(BridgeError::Connection(
                                    ConnectionError::Transport(detail.clone()),
                                ));
                            }
                            BridgeEvent::SendRejected => {
                                last_error = Some(BridgeError::NotConnected);
                            }
                            BridgeEvent::DecodeFailed { raw, detail } => {
                                last_error = Some(BridgeError::Decode(DecodeError {
                                    raw: raw.clone(),
                                    detail: detail.clone(),
                                }));
                            }
                            BridgeEvent::Transcription(result) => {
                                let _ = notify_tx
                                    .send(Notification::Transcription(result.clone()));
                            }
                        }
                        publish_status(&controller, last_error.as_ref(), &notify_tx, server)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "bridge event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Apply one UI intent through the mode controller
async fn apply_intent(
    controller: &mut ModeController,
    intent: Intent,
) -> Result<(), BridgeError> {
    match intent {
        Intent::StartLiveCapture => {
            // A refusal leaves mode and connection exactly as they were
            capture::probe_capture_permission()
                .map_err(|e| BridgeError::PermissionDenied(e.to_string()))?;
            controller.request_live_capture().await
        }
        Intent::Upload(payload) => controller.request_upload(Some(payload)).await,
        Intent::Reset => {
            controller.reset();
            Ok(())
        }
    }
}

/// Derive the current status view and push it to the snapshot and all
/// subscribed clients
async fn publish_status(
    controller: &ModeController,
    last_error: Option<&BridgeError>,
    notify_tx: &broadcast::Sender<Notification>,
    server: &Server,
) {
    let view = status::report(controller.connection_state(), controller.mode(), last_error);
    server
        .set_status(controller.connection_state(), controller.mode(), view.clone())
        .await;
    let _ = notify_tx.send(Notification::Status(view));
}
