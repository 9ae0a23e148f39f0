//! HTTP Handlers
//!
//! Request handlers for the HTTP endpoints next to the WebSocket hub.

pub mod online;
