//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Backend endpoint used when no override is present: local loopback on the
/// deployment's fixed port
pub const DEFAULT_BACKEND_URL: &str = "ws://127.0.0.1:8768";

/// Fixed wait between a close and the next connection attempt
const DEFAULT_RECONNECT_MS: u64 = 3000;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the transcription backend
    pub backend_url: String,

    /// Path to the Unix domain socket for the capture UI
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Delay before each reconnection attempt
    pub reconnect_delay: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("subtitle-bridge");

        let socket_path = std::env::var("SUBTITLE_BRIDGE_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("bridge.sock"));

        let backend_url = std::env::var("SUBTITLE_BRIDGE_BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let reconnect_delay = std::env::var("SUBTITLE_BRIDGE_RECONNECT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_RECONNECT_MS));

        Ok(Self {
            backend_url,
            socket_path,
            data_dir,
            reconnect_delay,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
