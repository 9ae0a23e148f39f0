//! Presence Cache Service
//!
//! Fleet-wide presence tracking on top of the shared cache.
//!
//! Key layout:
//! - `ws:conn:map` hash, field = user id, value = JSON [`PresenceRecord`]
//! - `online:last_seen` hash, field = user id, value = epoch seconds
//! - `ws:server:conns` reserved per-server set, not written here
//!
//! Both hashes share one expiration that is refreshed on every registration,
//! so records left behind by a crashed server eventually disappear.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::cache_service::{Cache, HashEntry};
use super::keys;
use crate::domain::{PresenceRecord, PresenceStore};
use crate::shared::error::AppError;

/// Presence store backed by any [`Cache`].
#[derive(Clone)]
pub struct CachePresenceStore {
    cache: Arc<dyn Cache>,
    server_id: String,
    ttl: Duration,
}

impl CachePresenceStore {
    pub fn new(cache: Arc<dyn Cache>, server_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            server_id: server_id.into(),
            ttl,
        }
    }
}

#[async_trait]
impl PresenceStore for CachePresenceStore {
    async fn mark_online(&self, user_id: &str) -> Result<(), AppError> {
        let now = Utc::now().timestamp();
        let record = PresenceRecord {
            user_id: user_id.to_string(),
            server_id: self.server_id.clone(),
            last_seen: now,
        };
        let data = serde_json::to_string(&record)?;

        self.cache
            .hash_set_many(
                &[
                    HashEntry::new(keys::CONN_MAP, user_id, data),
                    HashEntry::new(keys::LAST_SEEN, user_id, now.to_string()),
                ],
                self.ttl,
            )
            .await?;

        debug!(user_id = %user_id, server_id = %self.server_id, "Presence updated");
        Ok(())
    }

    async fn mark_offline(&self, user_id: &str) -> Result<(), AppError> {
        let removed = self.cache.hash_delete(keys::CONN_MAP, user_id).await?;
        debug!(user_id = %user_id, removed = removed, "Presence removed");
        Ok(())
    }

    async fn online_users(&self) -> Result<Vec<String>, AppError> {
        self.cache.hash_fields(keys::CONN_MAP).await
    }

    async fn is_online(&self, user_id: &str) -> Result<bool, AppError> {
        self.cache.hash_contains(keys::CONN_MAP, user_id).await
    }

    async fn record(&self, user_id: &str) -> Result<Option<PresenceRecord>, AppError> {
        let Some(data) = self.cache.hash_get(keys::CONN_MAP, user_id).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Malformed presence record");
                Ok(None)
            }
        }
    }
}
