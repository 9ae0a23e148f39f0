//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// Which concrete backend serves the cache and the log
    pub storage: StorageSettings,

    /// Hub and connection tuning
    pub hub: HubSettings,

    /// Presence tracking
    pub presence: PresenceSettings,

    /// Offline message buffering
    pub offline: OfflineSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
}

/// Backend kind for the cache and the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Shared Redis; required for a multi-server fleet
    Redis,
    /// Process-local; single node and tests
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

/// Hub and per-connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Identity of this process within the fleet
    pub server_id: String,

    /// Interval between protocol ping frames in milliseconds (default: 30000)
    pub heartbeat_interval_ms: u64,

    /// Maximum inbound message size in bytes (default: 1024)
    pub max_message_size: usize,

    /// Socket write buffer size in bytes (default: 1024)
    pub write_buffer_size: usize,

    /// Capacity of each connection's outbound queue (default: 256)
    pub outbound_queue_capacity: usize,

    /// Close connections with no inbound traffic for this long; 0 disables
    pub client_timeout_secs: u64,
}

/// Presence tracking settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    pub enabled: bool,

    /// Expiration of the presence maps in seconds (default: 3 days)
    pub ttl_secs: u64,
}

/// Offline message settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineSettings {
    /// Buffer in per-recipient cache lists
    pub cache_enabled: bool,

    /// Append to the durable message log
    pub log_enabled: bool,

    /// Expiration of a recipient's cache list in seconds (default: 12 hours)
    pub message_ttl_secs: u64,

    /// Log topic; tombstones go to "<topic>.marks"
    pub log_topic: String,

    /// Log entries older than this are trimmed on append; 0 keeps everything
    pub log_retention_secs: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the hub settings are inconsistent.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Self::builder(&environment)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__HUB__SERVER_ID=node-1 -> hub.server_id = node-1
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("hub.server_id", std::env::var("SERVER_ID").ok())?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    /// Defaults only; useful for tests and embedding.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder("test")?
            .set_override("storage.backend", "memory")?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    fn builder(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("storage.backend", "redis")?
            .set_default("hub.server_id", "hub-1")?
            .set_default("hub.heartbeat_interval_ms", 30000_i64)?
            .set_default("hub.max_message_size", 1024_i64)?
            .set_default("hub.write_buffer_size", 1024_i64)?
            .set_default("hub.outbound_queue_capacity", 256_i64)?
            .set_default("hub.client_timeout_secs", 0_i64)?
            .set_default("presence.enabled", true)?
            .set_default("presence.ttl_secs", 72 * 3600_i64)?
            .set_default("offline.cache_enabled", true)?
            .set_default("offline.log_enabled", false)?
            .set_default("offline.message_ttl_secs", 12 * 3600_i64)?
            .set_default("offline.log_topic", "offline-messages")?
            .set_default("offline.log_retention_secs", 24 * 3600_i64)?
            .set_default("cors.allowed_origins", Vec::<String>::new())
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.hub.server_id.trim().is_empty() {
            return Err(ConfigError::Message("hub.server_id must not be empty".into()));
        }
        if self.hub.outbound_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "hub.outbound_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.hub.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Message(
                "hub.heartbeat_interval_ms must be greater than zero".into(),
            ));
        }
        if self.offline.log_enabled && self.offline.log_topic.trim().is_empty() {
            return Err(ConfigError::Message(
                "offline.log_topic must be set when the log is enabled".into(),
            ));
        }
        Ok(self)
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Whether any component needs the cache backend.
    pub fn needs_cache(&self) -> bool {
        self.presence.enabled || self.offline.cache_enabled
    }
}

impl HubSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// `None` when idle detection is disabled.
    pub fn client_timeout(&self) -> Option<Duration> {
        (self.client_timeout_secs > 0).then(|| Duration::from_secs(self.client_timeout_secs))
    }
}

impl PresenceSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl OfflineSettings {
    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    pub fn log_retention(&self) -> Option<Duration> {
        (self.log_retention_secs > 0).then(|| Duration::from_secs(self.log_retention_secs))
    }
}
