//! Capture-side collaborators
//!
//! Device enumeration, a permission probe, and audio file loading. The bridge
//! never captures audio itself; these exist so the UI can populate its device
//! selector, fail fast on a permission refusal, and hand the bridge one
//! complete payload to upload.
//!
//! Built without the `audio-io` feature, enumeration reports no devices and
//! the probe always passes, which keeps headless builds honest about what
//! they can do.

use std::path::{Path, PathBuf};

#[cfg(feature = "audio-io")]
use cpal::traits::{DeviceTrait, HostTrait};

use crate::codec::AudioPayload;

/// Failures from the capture collaborators
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no audio input devices found")]
    NoDevices,

    #[error("audio input access refused: {0}")]
    PermissionDenied(String),

    #[error("failed to read audio file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One available audio input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
}

/// List available audio input devices
#[cfg(feature = "audio-io")]
pub fn list_input_devices() -> Result<Vec<InputDevice>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?
        .filter_map(|device| {
            let name = device.name().ok()?;
            let is_default = default_name.as_deref() == Some(name.as_str());
            Some(InputDevice { name, is_default })
        })
        .collect::<Vec<_>>();

    if devices.is_empty() {
        return Err(CaptureError::NoDevices);
    }
    Ok(devices)
}

#[cfg(not(feature = "audio-io"))]
pub fn list_input_devices() -> Result<Vec<InputDevice>, CaptureError> {
    Err(CaptureError::NoDevices)
}

/// Validate capture permission by opening and immediately releasing the
/// default input configuration; no stream is kept
#[cfg(feature = "audio-io")]
pub fn probe_capture_permission() -> Result<(), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoDevices)?;
    device
        .default_input_config()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
    Ok(())
}

#[cfg(not(feature = "audio-io"))]
pub fn probe_capture_permission() -> Result<(), CaptureError> {
    Ok(())
}

/// Read one user-selected audio file into a payload
pub async fn load_audio_file(path: &Path) -> Result<AudioPayload, CaptureError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| CaptureError::FileRead {
            path: path.to_owned(),
            source,
        })
}
