//! # Configuration Module
//!
//! This module handles application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notify_hub::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Hub {} listening on {}", settings.hub.server_id, settings.server_addr());
//! ```

mod settings;

pub use settings::*;
