//! # Domain Entities
//!
//! Core domain types of the messaging hub.
//!
//! - **WireMessage**: typed envelope exchanged over a connection
//! - **OfflineMessage**: persisted form of a message for an offline recipient
//! - **PresenceRecord**: which server holds a user's live connection
//!
//! ## Store Traits
//!
//! `OfflineStore` and `PresenceStore` define the backend contracts. They are
//! implemented in the infrastructure layer and injected at startup.

mod message;
mod offline_message;
mod presence;

pub use message::{MessageExtra, MessageType, Route, WireMessage};
pub use offline_message::{MessageStatus, OfflineMessage, OfflineStore};
pub use presence::{PresenceRecord, PresenceStore};

#[cfg(test)]
pub use offline_message::MockOfflineStore;
#[cfg(test)]
pub use presence::MockPresenceStore;
