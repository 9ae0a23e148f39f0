//! Offline Message Cache
//!
//! Buffers offline messages in one list per recipient (`offline:msg:<user>`).
//! Reading is destructive: the list is returned and cleared in one atomic
//! step, so a message is delivered at most once across reconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::cache_service::Cache;
use super::keys;
use crate::domain::{OfflineMessage, OfflineStore};
use crate::shared::error::AppError;

/// Cache-backed offline store.
#[derive(Clone)]
pub struct CacheOfflineStore {
    cache: Arc<dyn Cache>,
    expiration: Duration,
}

impl CacheOfflineStore {
    pub fn new(cache: Arc<dyn Cache>, expiration: Duration) -> Self {
        Self { cache, expiration }
    }
}

#[async_trait]
impl OfflineStore for CacheOfflineStore {
    fn backend(&self) -> &'static str {
        "cache"
    }

    async fn store_message(&self, message: &OfflineMessage) -> Result<(), AppError> {
        let data = serde_json::to_string(message)?;
        self.cache
            .list_push(&keys::offline_messages(&message.to), data, self.expiration)
            .await?;

        debug!(user_id = %message.to, message_id = %message.id, "Offline message cached");
        Ok(())
    }

    async fn get_offline_messages(&self, user_id: &str) -> Result<Vec<OfflineMessage>, AppError> {
        let items = self
            .cache
            .list_take_all(&keys::offline_messages(user_id))
            .await?;

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_str::<OfflineMessage>(&item) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(user_id = %user_id, error = %e, "Skipping malformed offline message"),
            }
        }

        Ok(messages)
    }

    async fn mark_message_as_read(&self, message_id: &str) -> Result<(), AppError> {
        // Messages leave the cache when they are read.
        debug!(message_id = %message_id, "Mark as read is a no-op for the cache store");
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), AppError> {
        debug!(message_id = %message_id, "Delete is a no-op for the cache store");
        Ok(())
    }
}
