//! Presence record and store trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Fleet-visible record of which server holds a user's live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub server_id: String,
    /// Epoch seconds of the last registration
    #[serde(alias = "last_ping")]
    pub last_seen: i64,
}

/// Cluster-wide presence tracking.
///
/// Records are refreshed on registration and removed on deregistration; the
/// backend expires them if a server dies without cleaning up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Record that `user_id` is connected to this server.
    async fn mark_online(&self, user_id: &str) -> Result<(), AppError>;

    /// Remove the record for `user_id`.
    async fn mark_offline(&self, user_id: &str) -> Result<(), AppError>;

    /// Every user with a presence record, across the fleet.
    async fn online_users(&self) -> Result<Vec<String>, AppError>;

    async fn is_online(&self, user_id: &str) -> Result<bool, AppError>;

    /// Full record for `user_id`, if any.
    async fn record(&self, user_id: &str) -> Result<Option<PresenceRecord>, AppError>;
}
