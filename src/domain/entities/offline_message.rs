//! Offline message entity and store trait.
//!
//! An offline message is the persisted form of a [`WireMessage`] whose
//! recipient had no reachable local connection at send time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{MessageExtra, MessageType, WireMessage};
use crate::shared::error::AppError;

/// Read state of an offline message, stored as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageStatus {
    #[default]
    Unread,
    Read,
}

impl From<MessageStatus> for u8 {
    fn from(status: MessageStatus) -> Self {
        match status {
            MessageStatus::Unread => 0,
            MessageStatus::Read => 1,
        }
    }
}

impl TryFrom<u8> for MessageStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unread),
            1 => Ok(Self::Read),
            other => Err(format!("invalid message status: {}", other)),
        }
    }
}

/// Persisted message for an unreachable recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineMessage {
    /// Receipt time, sender and a random suffix; sorts roughly by time.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub content: serde_json::Value,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub extra: MessageExtra,
}

impl OfflineMessage {
    /// Wrap a wire message for `recipient`, received at `received_at`.
    pub fn from_wire(message: WireMessage, recipient: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::make_id(received_at, &message.from),
            kind: message.kind,
            content: message.content,
            from: message.from,
            to: recipient.to_string(),
            timestamp: received_at,
            status: MessageStatus::Unread,
            extra: message.extra,
        }
    }

    /// `YYYYmmddHHMMSSmmm:<sender>:<uuidv7>`
    pub fn make_id(received_at: DateTime<Utc>, sender: &str) -> String {
        format!(
            "{}:{}:{}",
            received_at.format("%Y%m%d%H%M%S%3f"),
            sender,
            Uuid::now_v7().simple()
        )
    }

    pub fn is_read(&self) -> bool {
        self.status == MessageStatus::Read
    }
}

/// Storage for messages addressed to offline users.
///
/// Implementations are selected at startup from configuration; the hub only
/// sees this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn backend(&self) -> &'static str;

    /// Persist a message keyed by its recipient.
    async fn store_message(&self, message: &OfflineMessage) -> Result<(), AppError>;

    /// Messages buffered for `user_id`, oldest first.
    async fn get_offline_messages(&self, user_id: &str) -> Result<Vec<OfflineMessage>, AppError>;

    /// Flag a message as read.
    async fn mark_message_as_read(&self, message_id: &str) -> Result<(), AppError>;

    /// Remove a message.
    async fn delete_message(&self, message_id: &str) -> Result<(), AppError>;
}
