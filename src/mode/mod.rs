//! Mode management
//!
//! User intent (live capture vs file upload) orchestrated against the
//! connection manager. Modes are mutually exclusive; Idle re-enables both
//! controls.

mod controller;

pub use controller::{Intent, Mode, ModeController};
