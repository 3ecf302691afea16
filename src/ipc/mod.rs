//! Control surface for capture-UI communication

mod protocol;
mod server;

pub use protocol::{BridgeStatus, Notification, Request, Response};
pub use server::Server;
