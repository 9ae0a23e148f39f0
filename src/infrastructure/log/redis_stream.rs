//! Redis Streams message log.
//!
//! Each topic is a stream; each record is an entry with `key` and `payload`
//! fields. Entry ids are millisecond timestamps, which makes retention a
//! `XTRIM MINID` against `now - retention`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument, warn};

use super::{LogRecord, MessageLog};
use crate::shared::error::AppError;

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";

/// Entries fetched per `XRANGE` round trip.
const PAGE_SIZE: usize = 500;

type StreamEntry = (String, HashMap<String, String>);

/// `MessageLog` stored in Redis streams.
#[derive(Clone)]
pub struct RedisStreamLog {
    conn: ConnectionManager,
    retention: Option<Duration>,
}

impl RedisStreamLog {
    pub fn new(conn: ConnectionManager, retention: Option<Duration>) -> Self {
        Self { conn, retention }
    }

    async fn trim(&self, topic: &str, retention: Duration) -> Result<(), AppError> {
        let min_id = min_retained_id(Utc::now().timestamp_millis(), retention);
        let mut conn = self.conn.clone();

        let trimmed: u64 = redis::cmd("XTRIM")
            .arg(topic)
            .arg("MINID")
            .arg(&min_id)
            .query_async(&mut conn)
            .await?;

        if trimmed > 0 {
            debug!(topic = %topic, trimmed = trimmed, "Trimmed expired log entries");
        }
        Ok(())
    }
}

/// Lowest stream id that survives retention.
fn min_retained_id(now_ms: i64, retention: Duration) -> String {
    let cutoff = now_ms - retention.as_millis() as i64;
    format!("{}-0", cutoff.max(0))
}

/// Exclusive lower bound for the page after `last_id`.
fn after(last_id: &str) -> String {
    format!("({}", last_id)
}

#[async_trait]
impl MessageLog for RedisStreamLog {
    #[instrument(skip(self, payload), level = "debug")]
    async fn append(&self, topic: &str, key: &str, payload: String) -> Result<(), AppError> {
        let mut conn = self.conn.clone();

        let id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("*")
            .arg(KEY_FIELD)
            .arg(key)
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!(topic = %topic, key = %key, id = %id, "Log record appended");

        if let Some(retention) = self.retention {
            // Retention is housekeeping; the append already succeeded.
            if let Err(e) = self.trim(topic, retention).await {
                warn!(topic = %topic, error = %e, "Failed to trim log");
            }
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn read_all(&self, topic: &str) -> Result<Vec<LogRecord>, AppError> {
        let mut conn = self.conn.clone();
        let mut records = Vec::new();
        let mut start = "-".to_string();

        loop {
            let page: Vec<StreamEntry> = redis::cmd("XRANGE")
                .arg(topic)
                .arg(&start)
                .arg("+")
                .arg("COUNT")
                .arg(PAGE_SIZE)
                .query_async(&mut conn)
                .await?;

            let Some((last_id, _)) = page.last() else {
                break;
            };
            start = after(last_id);
            let full_page = page.len() == PAGE_SIZE;

            for (id, mut fields) in page {
                match (fields.remove(KEY_FIELD), fields.remove(PAYLOAD_FIELD)) {
                    (Some(key), Some(payload)) => records.push(LogRecord { key, payload }),
                    _ => warn!(topic = %topic, id = %id, "Skipping log entry without key/payload"),
                }
            }

            if !full_page {
                break;
            }
        }

        debug!(topic = %topic, count = records.len(), "Log replayed");
        Ok(records)
    }
}

impl std::fmt::Debug for RedisStreamLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamLog")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}
