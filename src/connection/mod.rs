//! Backend connection ownership
//!
//! The manager is the only holder of the transport handle; everything else
//! interacts through commands and broadcast events.

mod manager;
mod transport;

pub use manager::{Command, ConnectionManager, ConnectionState};
pub use transport::{ConnectionError, Connector, Frame, Transport, WsConnector};
