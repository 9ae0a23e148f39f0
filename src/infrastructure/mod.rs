//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Cache implementations (Redis, in-memory) and the stores built on them
//! - Append-only message log (Redis Streams, in-memory)
//! - Prometheus metrics

pub mod cache;
pub mod log;
pub mod metrics;

use std::sync::Arc;

use redis::aio::ConnectionManager;
use tracing::info;

use crate::config::{Settings, StorageBackend};
use crate::domain::{OfflineStore, PresenceStore};
use crate::shared::error::AppError;

use self::cache::{Cache, CacheOfflineStore, CachePresenceStore, MemoryCache, RedisCache};
use self::log::{LogOfflineStore, MemoryLog, MessageLog, RedisStreamLog};

/// Stores selected by configuration. Disabled features are `None`.
#[derive(Clone, Default)]
pub struct Backends {
    pub presence: Option<Arc<dyn PresenceStore>>,
    pub cache_store: Option<Arc<dyn OfflineStore>>,
    pub log_store: Option<Arc<dyn OfflineStore>>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("presence", &self.presence.is_some())
            .field("cache_store", &self.cache_store.is_some())
            .field("log_store", &self.log_store.is_some())
            .finish()
    }
}

/// Build the stores enabled in `settings`.
///
/// Redis is only contacted when the configured backend is `redis` and at
/// least one feature needs it.
pub async fn connect_backends(settings: &Settings) -> Result<Backends, AppError> {
    let needs_backend = settings.needs_cache() || settings.offline.log_enabled;
    if !needs_backend {
        info!("Presence and offline buffering disabled");
        return Ok(Backends::default());
    }

    let (cache, log): (Arc<dyn Cache>, Arc<dyn MessageLog>) = match settings.storage.backend {
        StorageBackend::Redis => {
            let conn = cache::create_redis_client(&settings.redis).await?;
            redis_backends(conn, settings)
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage backend");
            (
                Arc::new(MemoryCache::new()),
                Arc::new(MemoryLog::new(settings.offline.log_retention())),
            )
        }
    };

    Ok(build_stores(settings, cache, log))
}

fn redis_backends(
    conn: ConnectionManager,
    settings: &Settings,
) -> (Arc<dyn Cache>, Arc<dyn MessageLog>) {
    (
        Arc::new(RedisCache::new(conn.clone())),
        Arc::new(RedisStreamLog::new(conn, settings.offline.log_retention())),
    )
}

/// Wrap the raw backends in the stores `settings` enables.
pub fn build_stores(
    settings: &Settings,
    cache: Arc<dyn Cache>,
    log: Arc<dyn MessageLog>,
) -> Backends {
    let presence = settings.presence.enabled.then(|| {
        Arc::new(CachePresenceStore::new(
            cache.clone(),
            settings.hub.server_id.clone(),
            settings.presence.ttl(),
        )) as Arc<dyn PresenceStore>
    });

    let cache_store = settings.offline.cache_enabled.then(|| {
        Arc::new(CacheOfflineStore::new(cache, settings.offline.message_ttl()))
            as Arc<dyn OfflineStore>
    });

    let log_store = settings.offline.log_enabled.then(|| {
        Arc::new(LogOfflineStore::new(log, settings.offline.log_topic.clone()))
            as Arc<dyn OfflineStore>
    });

    info!(
        presence = presence.is_some(),
        cache_store = cache_store.is_some(),
        log_store = log_store.is_some(),
        "Storage backends ready"
    );

    Backends {
        presence,
        cache_store,
        log_store,
    }
}
