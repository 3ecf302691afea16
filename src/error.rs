//! Bridge-level error taxonomy
//!
//! Every variant is terminal for the attempted operation and non-fatal for
//! the process; surfacing happens through status views and log records.

use crate::codec::DecodeError;
use crate::connection::ConnectionError;

/// Errors surfaced to the UI as status text
///
/// Clonable so the last error can ride inside derived status state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level failure; handled by auto-reconnect, surfaced as status
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Malformed inbound message; the connection stays usable
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A send was attempted outside the Connected state
    #[error("not connected to the backend")]
    NotConnected,

    /// Upload requested without a payload
    #[error("no audio file selected")]
    NoFileSelected,

    /// Capture or device access was refused
    #[error("audio capture permission denied: {0}")]
    PermissionDenied(String),
}
