//! Unix domain socket server for the capture UI
//!
//! Provides request-response communication and push notifications: subscribed
//! clients receive every derived status view and every transcription unit.
//! Capture and upload intents are queued to the drive loop; their outcomes
//! come back as notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{self, CaptureError};
use crate::connection::ConnectionState;
use crate::error::BridgeError;
use crate::mode::{Intent, Mode};
use crate::status::StatusView;

use super::protocol::{BridgeStatus, Notification, Request, Response};

/// Upper bound for one framed message
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Control-surface server handling UI connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    intent_tx: mpsc::Sender<Intent>,
    notify_tx: broadcast::Sender<Notification>,
}

/// Shared server state
struct ServerState {
    status: BridgeStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new control-surface server
    pub fn new(
        socket_path: &Path,
        intent_tx: mpsc::Sender<Intent>,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: BridgeStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "control surface listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            intent_tx,
            notify_tx,
        })
    }

    /// Update the status snapshot served to `get_status` callers
    pub async fn set_status(&self, connection: ConnectionState, mode: Mode, view: StatusView) {
        let mut state = self.state.write().await;
        let changed =
            state.status.connection != connection || state.status.mode != mode;
        state.status.connection = connection;
        state.status.mode = mode;
        state.status.view = view;

        if changed {
            info!(%connection, %mode, "control surface: status snapshot updated");
        }
    }

    /// Run the server, accepting UI connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let intent_tx = self.intent_tx.clone();
                    let notify_tx = self.notify_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, intent_tx, notify_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single UI connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        intent_tx: mpsc::Sender<Intent>,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();

        // Responses and notifications share the write half through one
        // outbound queue so frames never interleave
        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(64);
        let writer_task = tokio::spawn(Self::write_outbound(writer, out_rx));
        let mut notify_task: Option<JoinHandle<()>> = None;

        let mut len_buf = [0u8; 4];
        let result = loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_BYTES {
                warn!(len, "message too large, disconnecting");
                break Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut msg_buf).await {
                break Err(e.into());
            }

            // Parse request
            let request: Request = match serde_json::from_slice(&msg_buf) {
                Ok(request) => request,
                Err(e) => break Err(anyhow::Error::from(e).context("failed to parse request")),
            };

            debug!(?request, "received request");

            let response = match request {
                Request::Subscribe => {
                    if notify_task.is_none() {
                        notify_task =
                            Some(Self::spawn_notifier(notify_tx.subscribe(), out_tx.clone()));
                        debug!("client subscribed to notifications");
                    }
                    Response::Subscribed
                }
                other => Self::process_request(other, &state, &intent_tx).await,
            };

            // Send response
            let frame = match encode_frame(&response) {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            };
            if out_tx.send(frame).await.is_err() {
                break Ok(());
            }
        };

        if let Some(task) = notify_task {
            task.abort();
        }
        writer_task.abort();
        result
    }

    /// Forward broadcast notifications into one client's outbound queue
    fn spawn_notifier(
        mut notify_rx: broadcast::Receiver<Notification>,
        out_tx: mpsc::Sender<Vec<u8>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match notify_rx.recv().await {
                    Ok(note) => {
                        let frame = match encode_frame(&note) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(?e, "failed to encode notification");
                                continue;
                            }
                        };
                        if out_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "notification receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Drain the outbound queue into the socket
    async fn write_outbound(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Vec<u8>>) {
        while let Some(frame) = out_rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        intent_tx: &mpsc::Sender<Intent>,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::ListDevices => match capture::list_input_devices() {
                Ok(devices) => {
                    let default = devices
                        .iter()
                        .find(|d| d.is_default)
                        .map(|d| d.name.clone());
                    Response::Devices {
                        inputs: devices.into_iter().map(|d| d.name).collect(),
                        default,
                    }
                }
                // An empty list is an answer, not a failure; the UI disables
                // the capture control
                Err(CaptureError::NoDevices) => Response::Devices {
                    inputs: Vec::new(),
                    default: None,
                },
                Err(e) => Response::Error {
                    code: "permission_denied".to_string(),
                    message: e.to_string(),
                },
            },

            Request::StartLiveCapture => {
                Self::queue_intent(intent_tx, Intent::StartLiveCapture).await
            }

            Request::UploadAudio { path } => {
                if path.as_os_str().is_empty() {
                    return Response::from_error(&BridgeError::NoFileSelected);
                }
                match capture::load_audio_file(&path).await {
                    Ok(payload) => Self::queue_intent(intent_tx, Intent::Upload(payload)).await,
                    Err(e) => Response::Error {
                        code: "file_read".to_string(),
                        message: e.to_string(),
                    },
                }
            }

            Request::Reset => Self::queue_intent(intent_tx, Intent::Reset).await,

            // Handled in the client loop, where the subscription lives
            Request::Subscribe => Response::Subscribed,
        }
    }

    async fn queue_intent(intent_tx: &mpsc::Sender<Intent>, intent: Intent) -> Response {
        match intent_tx.send(intent).await {
            Ok(()) => Response::Accepted,
            Err(_) => Response::Error {
                code: "shutting_down".to_string(),
                message: "bridge is shutting down".to_string(),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("control surface shutdown complete");
    }
}

/// Length-prefix one JSON message
fn encode_frame<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_socket(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "subtitle-bridge-{}-{}.sock",
            tag,
            std::process::id()
        ))
    }

    async fn read_frame<T: serde::de::DeserializeOwned>(client: &mut UnixStream) -> T {
        let mut len_buf = [0u8; 4];
        client.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        client.read_exact(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    async fn write_request(client: &mut UnixStream, request: &Request) {
        let frame = encode_frame(request).unwrap();
        client.write_all(&frame).await.unwrap();
    }

    #[test]
    fn test_frame_encoding() {
        let frame = encode_frame(&Response::Pong).unwrap();
        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        let resp: Response = serde_json::from_slice(&frame[4..]).unwrap();
        assert!(matches!(resp, Response::Pong));
    }

    #[tokio::test]
    async fn test_ping_round_trip() {
        let path = test_socket("ping");
        let (intent_tx, _intent_rx) = mpsc::channel(8);
        let (notify_tx, _) = broadcast::channel(8);
        let server = Server::new(&path, intent_tx, notify_tx).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut client = UnixStream::connect(&path).await.unwrap();
        write_request(&mut client, &Request::Ping).await;
        let resp: Response = read_frame(&mut client).await;
        assert!(matches!(resp, Response::Pong));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_empty_upload_path_rejected_without_intent() {
        let path = test_socket("upload");
        let (intent_tx, mut intent_rx) = mpsc::channel(8);
        let (notify_tx, _) = broadcast::channel(8);
        let server = Server::new(&path, intent_tx, notify_tx).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut client = UnixStream::connect(&path).await.unwrap();
        write_request(
            &mut client,
            &Request::UploadAudio {
                path: PathBuf::new(),
            },
        )
        .await;
        let resp: Response = read_frame(&mut client).await;
        match resp {
            Response::Error { code, .. } => assert_eq!(code, "no_file_selected"),
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(intent_rx.try_recv().is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_capture_request_queues_intent() {
        let path = test_socket("capture");
        let (intent_tx, mut intent_rx) = mpsc::channel(8);
        let (notify_tx, _) = broadcast::channel(8);
        let server = Server::new(&path, intent_tx, notify_tx).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut client = UnixStream::connect(&path).await.unwrap();
        write_request(&mut client, &Request::StartLiveCapture).await;
        let resp: Response = read_frame(&mut client).await;
        assert!(matches!(resp, Response::Accepted));
        assert!(matches!(
            intent_rx.recv().await,
            Some(Intent::StartLiveCapture)
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_subscriber_receives_notifications() {
        let path = test_socket("notify");
        let (intent_tx, _intent_rx) = mpsc::channel(8);
        let (notify_tx, _) = broadcast::channel(8);
        let server = Server::new(&path, intent_tx, notify_tx.clone()).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut client = UnixStream::connect(&path).await.unwrap();
        write_request(&mut client, &Request::Subscribe).await;
        let resp: Response = read_frame(&mut client).await;
        assert!(matches!(resp, Response::Subscribed));

        notify_tx
            .send(Notification::Transcription(
                crate::codec::TranscriptionResult {
                    primary_text: "नमस्ते".into(),
                    secondary_text: "hello".into(),
                },
            ))
            .unwrap();

        let note: Notification = read_frame(&mut client).await;
        match note {
            Notification::Transcription(result) => {
                assert_eq!(result.secondary_text, "hello");
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        let _ = std::fs::remove_file(&path);
    }
}
