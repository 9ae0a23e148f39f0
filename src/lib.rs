//! # Notify Hub Library
//!
//! This crate provides a real-time messaging hub with:
//! - A WebSocket endpoint that registers one connection per client
//! - Direct, broadcast, and notification routing between connections
//! - Fleet-wide presence tracking
//! - Offline buffering in a cache-backed or log-backed store
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Wire messages, offline messages, and store traits
//! - **Infrastructure Layer**: Cache, message log, and metrics implementations
//! - **Presentation Layer**: WebSocket hub, upgrade handler, and HTTP routes
//!
//! ## Module Structure
//!
//! ```text
//! notify_hub/
//! +-- config/         Configuration management
//! +-- domain/         Messages and store traits
//! +-- infrastructure/ Redis/in-memory stores and metrics
//! +-- presentation/   Hub, WebSocket handlers, HTTP routes
//! +-- shared/         Common utilities (errors, validation)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core types and store traits
pub mod domain;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
