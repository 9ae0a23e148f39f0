//! Message Log Module
//!
//! Durable append-only log of keyed records, and the log-backed offline store.
//!
//! Records are never mutated. Read and delete state is expressed as control
//! records on a side topic (`<topic>.marks`) and folded in on replay.
//!
//! Implementations:
//! - `RedisStreamLog`: one Redis stream per topic (`XADD` / `XRANGE`)
//! - `MemoryLog`: process-local, for single-node deployments and tests

mod memory_log;
mod offline_log;
mod redis_stream;

pub use memory_log::MemoryLog;
pub use offline_log::{LogOfflineStore, MarkAction, MarkRecord};
pub use redis_stream::RedisStreamLog;

use async_trait::async_trait;

use crate::shared::error::AppError;

/// One keyed record on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: String,
    pub payload: String,
}

impl LogRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

/// Append-only keyed log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Appends a record to `topic`.
    async fn append(&self, topic: &str, key: &str, payload: String) -> Result<(), AppError>;

    /// Every retained record of `topic`, in append order.
    async fn read_all(&self, topic: &str) -> Result<Vec<LogRecord>, AppError>;
}

/// Name of the control topic paired with `topic`.
pub fn marks_topic(topic: &str) -> String {
    format!("{}.marks", topic)
}
