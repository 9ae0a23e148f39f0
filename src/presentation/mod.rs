//! Presentation Layer
//!
//! HTTP routes and the WebSocket hub.

pub mod http;
pub mod middleware;
pub mod websocket;
