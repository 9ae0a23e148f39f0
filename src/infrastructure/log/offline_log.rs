//! Log-backed offline store.
//!
//! Every offline message is appended to the shared topic keyed by recipient.
//! Retrieval replays the whole topic and keeps the recipient's records, so it
//! is non-destructive and costs a full scan per call. A per-user stream would
//! avoid the scan; the shared topic is kept so that every server reads the
//! same history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{marks_topic, MessageLog};
use crate::domain::{MessageStatus, OfflineMessage, OfflineStore};
use crate::shared::error::AppError;

/// Control action recorded on the marks topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkAction {
    Read,
    Delete,
}

/// Tombstone-style control record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRecord {
    /// `mark_read` or `mark_delete`
    #[serde(rename = "type")]
    pub kind: String,
    pub message_id: String,
    pub action: MarkAction,
}

impl MarkRecord {
    pub fn new(message_id: &str, action: MarkAction) -> Self {
        let kind = match action {
            MarkAction::Read => "mark_read",
            MarkAction::Delete => "mark_delete",
        };
        Self {
            kind: kind.to_string(),
            message_id: message_id.to_string(),
            action,
        }
    }
}

/// Offline store on top of a [`MessageLog`].
#[derive(Clone)]
pub struct LogOfflineStore {
    log: Arc<dyn MessageLog>,
    topic: String,
    marks: String,
}

impl LogOfflineStore {
    pub fn new(log: Arc<dyn MessageLog>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        let marks = marks_topic(&topic);
        Self { log, topic, marks }
    }

    async fn append_mark(&self, message_id: &str, action: MarkAction) -> Result<(), AppError> {
        let data = serde_json::to_string(&MarkRecord::new(message_id, action))?;
        self.log.append(&self.marks, message_id, data).await?;
        debug!(message_id = %message_id, action = ?action, "Mark appended");
        Ok(())
    }

    /// Latest state per message id; a delete is final.
    async fn load_marks(&self) -> Result<HashMap<String, MarkAction>, AppError> {
        let mut marks = HashMap::new();
        for record in self.log.read_all(&self.marks).await? {
            let mark: MarkRecord = match serde_json::from_str(&record.payload) {
                Ok(mark) => mark,
                Err(e) => {
                    warn!(topic = %self.marks, error = %e, "Skipping malformed mark");
                    continue;
                }
            };
            let state = marks.entry(mark.message_id).or_insert(mark.action);
            if *state != MarkAction::Delete {
                *state = mark.action;
            }
        }
        Ok(marks)
    }
}

#[async_trait]
impl OfflineStore for LogOfflineStore {
    fn backend(&self) -> &'static str {
        "log"
    }

    async fn store_message(&self, message: &OfflineMessage) -> Result<(), AppError> {
        let data = serde_json::to_string(message)?;
        self.log.append(&self.topic, &message.to, data).await?;

        debug!(topic = %self.topic, user_id = %message.to, "Offline message logged");
        Ok(())
    }

    async fn get_offline_messages(&self, user_id: &str) -> Result<Vec<OfflineMessage>, AppError> {
        let marks = self.load_marks().await?;
        let mut messages = Vec::new();

        for record in self.log.read_all(&self.topic).await? {
            if record.key != user_id {
                continue;
            }
            let mut message: OfflineMessage = match serde_json::from_str(&record.payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Skipping malformed offline record");
                    continue;
                }
            };
            match marks.get(&message.id) {
                Some(MarkAction::Delete) => continue,
                Some(MarkAction::Read) => message.status = MessageStatus::Read,
                None => {}
            }
            messages.push(message);
        }

        debug!(user_id = %user_id, count = messages.len(), "Offline messages replayed");
        Ok(messages)
    }

    async fn mark_message_as_read(&self, message_id: &str) -> Result<(), AppError> {
        self.append_mark(message_id, MarkAction::Read).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), AppError> {
        self.append_mark(message_id, MarkAction::Delete).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageType, WireMessage};
    use crate::infrastructure::log::MemoryLog;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn offline(from: &str, to: &str, text: &str, offset_ms: i64) -> OfflineMessage {
        let at = Utc::now() + Duration::milliseconds(offset_ms);
        let mut wire = WireMessage::new(MessageType::Chat, text).to(to);
        wire.stamp(from, at);
        OfflineMessage::from_wire(wire, to, at)
    }

    fn store(log: Arc<MemoryLog>) -> LogOfflineStore {
        LogOfflineStore::new(log, "offline-messages")
    }

    #[tokio::test]
    async fn test_replay_filters_by_recipient_and_is_repeatable() {
        let store = store(Arc::new(MemoryLog::new(None)));
        let to_bob = offline("alice", "bob", "hi bob", 0);
        store.store_message(&to_bob).await.unwrap();
        store.store_message(&offline("alice", "dave", "hi dave", 1)).await.unwrap();

        assert_eq!(store.get_offline_messages("bob").await.unwrap(), vec![to_bob.clone()]);
        assert_eq!(store.get_offline_messages("bob").await.unwrap(), vec![to_bob]);
    }

    #[tokio::test]
    async fn test_marks_go_to_side_topic() {
        let log = Arc::new(MemoryLog::new(None));
        let store = store(log.clone());
        let message = offline("alice", "bob", "hi", 0);
        store.store_message(&message).await.unwrap();

        store.mark_message_as_read(&message.id).await.unwrap();

        assert_eq!(log.len("offline-messages"), 1);
        let marks = log.read_all("offline-messages.marks").await.unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].key, message.id);
        let mark: MarkRecord = serde_json::from_str(&marks[0].payload).unwrap();
        assert_eq!(mark, MarkRecord::new(&message.id, MarkAction::Read));
        assert_eq!(mark.kind, "mark_read");
    }

    #[tokio::test]
    async fn test_replay_applies_read_and_delete_marks() {
        let store = store(Arc::new(MemoryLog::new(None)));
        let read = offline("alice", "bob", "read me", 0);
        let deleted = offline("carol", "bob", "delete me", 1);
        let untouched = offline("dave", "bob", "untouched", 2);
        for message in [&read, &deleted, &untouched] {
            store.store_message(message).await.unwrap();
        }

        store.mark_message_as_read(&read.id).await.unwrap();
        store.delete_message(&deleted.id).await.unwrap();
        store.mark_message_as_read(&deleted.id).await.unwrap();

        let messages = store.get_offline_messages("bob").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_read());
        assert_eq!(messages[0].content, "read me");
        assert_eq!(messages[1].id, untouched.id);
        assert!(!messages[1].is_read());
    }

    #[tokio::test]
    async fn test_marks_stay_with_their_own_message() {
        let store = store(Arc::new(MemoryLog::new(None)));
        let at = Utc::now();
        let for_bob = OfflineMessage::from_wire(
            WireMessage::new(MessageType::System, "notice").to("bob"),
            "bob",
            at,
        );
        let for_carol = OfflineMessage::from_wire(
            WireMessage::new(MessageType::System, "notice").to("carol"),
            "carol",
            at,
        );
        assert_ne!(for_bob.id, for_carol.id);
        store.store_message(&for_bob).await.unwrap();
        store.store_message(&for_carol).await.unwrap();

        store.delete_message(&for_bob.id).await.unwrap();

        assert!(store.get_offline_messages("bob").await.unwrap().is_empty());
        let carol = store.get_offline_messages("carol").await.unwrap();
        assert_eq!(carol, vec![for_carol]);
        assert!(!carol[0].is_read());
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let log = Arc::new(MemoryLog::new(None));
        let store = store(log.clone());
        log.append("offline-messages", "bob", "garbage".into()).await.unwrap();
        log.append("offline-messages.marks", "x", "garbage".into()).await.unwrap();
        store.store_message(&offline("alice", "bob", "ok", 0)).await.unwrap();

        let messages = store.get_offline_messages("bob").await.unwrap();
        assert_eq!(messages.len(), 1);
    }
}
