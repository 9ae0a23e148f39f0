//! Cache Service
//!
//! Cache trait covering the list and hash operations the hub needs, plus the
//! Redis implementation.
//!
//! The trait is object safe so that the concrete backend can be chosen at
//! startup and shared as `Arc<dyn Cache>`.
//!
//! # Example
//!
//! ```rust,ignore
//! use notify_hub::infrastructure::cache::{Cache, RedisCache};
//!
//! let cache = RedisCache::new(redis_connection);
//!
//! cache.list_push("offline:msg:bob", payload, ttl).await?;
//! let pending = cache.list_take_all("offline:msg:bob").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, instrument};

use crate::shared::error::AppError;

/// One field write in a multi-hash update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub key: String,
    pub field: String,
    pub value: String,
}

impl HashEntry {
    pub fn new(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Cache operations used by presence tracking and the offline buffer.
///
/// Per-key operations are atomic; no ordering is implied across keys.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Appends `value` to the tail of the list at `key` and (re)sets the
    /// key's expiration.
    async fn list_push(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;

    /// Atomically returns every element of the list at `key` (head first)
    /// and deletes the key.
    async fn list_take_all(&self, key: &str) -> Result<Vec<String>, AppError>;

    /// Writes all entries and refreshes the expiration of every touched key
    /// in a single atomic step.
    async fn hash_set_many(&self, entries: &[HashEntry], ttl: Duration) -> Result<(), AppError>;

    /// Removes `field` from the hash at `key`.
    ///
    /// Returns `true` if the field existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, AppError>;

    /// Reads one field of the hash at `key`.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, AppError>;

    /// Every field name of the hash at `key`.
    async fn hash_fields(&self, key: &str) -> Result<Vec<String>, AppError>;

    async fn hash_contains(&self, key: &str, field: &str) -> Result<bool, AppError>;
}

/// Redis-backed cache implementation.
///
/// Uses a Redis ConnectionManager for efficient connection pooling and
/// automatic reconnection handling.
#[derive(Clone)]
pub struct RedisCache {
    /// Redis connection manager with automatic reconnection
    conn: ConnectionManager,
    /// Optional key prefix for namespacing
    prefix: Option<Arc<str>>,
}

impl RedisCache {
    /// Creates a new RedisCache instance.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, prefix: None }
    }

    /// Creates a new RedisCache instance with a key prefix.
    ///
    /// All keys will be automatically prefixed, useful when several hub
    /// deployments share one Redis.
    ///
    /// # Example
    /// ```rust,ignore
    /// let cache = RedisCache::with_prefix(conn, "hub:v1:");
    /// // key "ws:conn:map" becomes "hub:v1:ws:conn:map"
    /// ```
    pub fn with_prefix(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: Some(prefix.into()),
        }
    }

    /// Formats a key with the optional prefix.
    fn format_key(&self, key: &str) -> String {
        format_key(self.prefix.as_deref(), key)
    }
}

fn format_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, key),
        None => key.to_string(),
    }
}

/// Redis EXPIRE takes whole seconds; never round a positive TTL down to 0.
fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl Cache for RedisCache {
    #[instrument(skip(self, value), level = "debug")]
    async fn list_push(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .rpush(&full_key, value)
            .ignore()
            .expire(&full_key, ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(key = %full_key, ttl = ttl.as_secs(), "List push");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_take_all(&self, key: &str) -> Result<Vec<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        // MULTI/EXEC so that a concurrent push lands either before the read
        // or after the delete, never in between.
        let (items,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(&full_key, 0, -1)
            .del(&full_key)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(key = %full_key, count = items.len(), "List take all");
        Ok(items)
    }

    #[instrument(skip(self, entries), level = "debug")]
    async fn hash_set_many(&self, entries: &[HashEntry], ttl: Duration) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for entry in entries {
            let full_key = self.format_key(&entry.key);
            pipe.hset(&full_key, &entry.field, &entry.value)
                .ignore()
                .expire(&full_key, ttl_secs(ttl))
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(count = entries.len(), "Hash set many");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let removed: u64 = conn.hdel(&full_key, field).await?;
        debug!(key = %full_key, field = %field, removed = removed, "Hash delete");

        Ok(removed > 0)
    }

    #[instrument(skip(self), level = "debug")]
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let value: Option<String> = conn.hget(&full_key, field).await?;
        Ok(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn hash_fields(&self, key: &str) -> Result<Vec<String>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let fields: Vec<String> = conn.hkeys(&full_key).await?;
        Ok(fields)
    }

    #[instrument(skip(self), level = "debug")]
    async fn hash_contains(&self, key: &str, field: &str) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let exists: bool = conn.hexists(&full_key, field).await?;
        Ok(exists)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
