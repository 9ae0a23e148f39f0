//! # Domain Layer
//!
//! Message types and the store contracts the hub depends on.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Store traits define data access contracts
//! - Routing decisions are pure functions of the message

pub mod entities;

// Re-export commonly used types
pub use entities::*;
