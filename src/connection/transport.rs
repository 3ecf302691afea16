//! Transport seam for the connection manager
//!
//! The manager's state machine talks to a [`Transport`] rather than a raw
//! socket, so tests can drive it with an in-memory pair and production wires
//! the WebSocket client in at startup. No other module ever holds the handle.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Transport-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The connection attempt never produced an open transport
    #[error("failed to open backend connection: {0}")]
    OpenFailed(String),

    /// The transport failed after opening
    #[error("backend transport error: {0}")]
    Transport(String),
}

/// One frame on the duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON text frame
    Text(String),
    /// Unframed binary payload
    Binary(Vec<u8>),
    /// Peer-initiated close, with code and reason when the peer sent them
    Close(Option<(u16, String)>),
}

/// A live duplex connection
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Write one frame to the peer
    async fn send(&mut self, frame: Frame) -> Result<(), ConnectionError>;

    /// Next inbound frame; `None` once the stream has ended
    async fn next(&mut self) -> Option<Result<Frame, ConnectionError>>;

    /// Close the transport, ignoring failures on an already-dead peer
    async fn close(&mut self);
}

/// Establishes transports on demand; at most one is ever live
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Transport: Transport;

    async fn connect(&mut self) -> Result<Self::Transport, ConnectionError>;
}

/// WebSocket client connector for the backend endpoint
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&mut self) -> Result<WsTransport, ConnectionError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectionError::OpenFailed(e.to_string()))?;
        Ok(WsTransport { inner: stream })
    }
}

/// WebSocket transport over the tungstenite client stream
pub struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Close(_) => Message::Close(None),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn next(&mut self) -> Option<Result<Frame, ConnectionError>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes.to_vec()))),
                Ok(Message::Close(close)) => Some(Ok(Frame::Close(
                    close.map(|f| (u16::from(f.code), f.reason.to_string())),
                ))),
                Ok(other) => {
                    // Ping/pong handled by tungstenite itself
                    debug!(?other, "ignoring non-data frame");
                    continue;
                }
                Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
            };
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
