//! WebSocket Hub
//!
//! Real-time messaging over WebSocket connections.

pub mod connection;
pub mod handler;
pub mod hub;

pub use connection::{Connection, Outbound, PumpSettings, SendError};
pub use handler::{attach, ws_handler, ConnectParams};
pub use hub::{Hub, HubContext, SYSTEM_SENDER};
