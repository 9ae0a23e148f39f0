//! In-process message log.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{LogRecord, MessageLog};
use crate::shared::error::AppError;

#[derive(Debug)]
struct Entry {
    appended_at: Instant,
    record: LogRecord,
}

/// `MessageLog` kept in memory, with the same retention rule as the Redis log.
#[derive(Debug, Default)]
pub struct MemoryLog {
    topics: DashMap<String, Vec<Entry>>,
    retention: Option<Duration>,
}

impl MemoryLog {
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            topics: DashMap::new(),
            retention,
        }
    }

    /// Number of retained records on `topic`.
    pub fn len(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|entries| entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    async fn append(&self, topic: &str, key: &str, payload: String) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entries = self.topics.entry(topic.to_string()).or_default();

        if let Some(retention) = self.retention {
            entries.retain(|entry| now.duration_since(entry.appended_at) < retention);
        }
        entries.push(Entry {
            appended_at: now,
            record: LogRecord::new(key, payload),
        });
        Ok(())
    }

    async fn read_all(&self, topic: &str) -> Result<Vec<LogRecord>, AppError> {
        Ok(self
            .topics
            .get(topic)
            .map(|entries| entries.iter().map(|entry| entry.record.clone()).collect())
            .unwrap_or_default())
    }
}
