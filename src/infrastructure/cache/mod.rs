//! Cache Module
//!
//! Redis connection management and the cache-backed hub stores.
//!
//! This module provides:
//! - Redis connection management with automatic reconnection
//! - A `Cache` trait abstracting the list/hash operations the hub needs
//! - `RedisCache` and `MemoryCache` implementations
//! - `CachePresenceStore` and `CacheOfflineStore` built on the trait
//!
//! # Architecture
//!
//! ```text
//! +---------------------+   +---------------------+
//! | CachePresenceStore  |   | CacheOfflineStore   |
//! +---------------------+   +---------------------+
//!            \                       /
//!             v                     v
//!           +-------------------------+
//!           |       Cache Trait       |  <-- Abstract interface
//!           +-------------------------+
//!              |                  |
//!              v                  v
//!      +--------------+    +--------------+
//!      |  RedisCache  |    | MemoryCache  |
//!      +--------------+    +--------------+
//! ```

mod cache_service;
mod memory_cache;
mod offline_cache;
mod presence_cache;

pub use cache_service::{Cache, HashEntry, RedisCache};
pub use memory_cache::MemoryCache;
pub use offline_cache::CacheOfflineStore;
pub use presence_cache::CachePresenceStore;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
///
/// The connection manager handles connection pooling and automatic
/// reconnection when the connection is lost.
///
/// # Errors
/// Returns `redis::RedisError` if the URL is invalid or the first
/// connection attempt fails.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Cache key names shared by every server in the fleet.
pub mod keys {
    /// Hash of online users: field = user id, value = presence record JSON
    pub const CONN_MAP: &str = "ws:conn:map";

    /// Hash of last-seen epoch seconds per user
    pub const LAST_SEEN: &str = "online:last_seen";

    /// Per-server set of active connections (reserved)
    pub const SERVER_CONNS: &str = "ws:server:conns";

    /// Prefix for per-recipient offline lists (e.g., "offline:msg:user_id")
    pub const OFFLINE_MESSAGES: &str = "offline:msg:";

    /// Generates the offline list key for a user
    #[inline]
    pub fn offline_messages(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", OFFLINE_MESSAGES, user_id)
    }

    /// Generates the reserved connection-set key for a server
    #[inline]
    pub fn server_conns(server_id: impl std::fmt::Display) -> String {
        format!("{}:{}", SERVER_CONNS, server_id)
    }
}
