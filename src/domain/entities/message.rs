//! Wire message exchanged over a connection.
//!
//! One JSON object per WebSocket frame:
//!
//! ```json
//! {
//!   "type": "chat",
//!   "content": "hi",
//!   "from": "alice",
//!   "to": "bob",
//!   "createdAt": "2024-01-01T00:00:00Z",
//!   "extra": { "postId": "42" }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Message kinds understood by the hub.
///
/// Unrecognised values decode as [`MessageType::Unknown`] so that a client
/// speaking a newer protocol is ignored rather than disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Direct or broadcast chat
    Chat,
    /// A post was liked
    Like,
    /// A post was collected (bookmarked)
    Collect,
    /// A post was commented on
    Comment,
    /// A user was mentioned
    Mention,
    /// Server-originated notice
    System,
    /// Client keep-alive
    #[serde(alias = "ping")]
    Heartbeat,
    /// Anything else
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// String form used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Like => "like",
            Self::Collect => "collect",
            Self::Comment => "comment",
            Self::Mention => "mention",
            Self::System => "system",
            Self::Heartbeat => "heartbeat",
            Self::Unknown => "unknown",
        }
    }

    /// Social-interaction notifications tied to a post.
    pub fn is_post_notification(&self) -> bool {
        matches!(self, Self::Like | Self::Collect | Self::Comment)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional metadata attached to notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    /// Action qualifier (like/unlike, collect/uncollect, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl MessageExtra {
    /// Returns the related post id when it is present and non-empty.
    pub fn post_id(&self) -> Option<&str> {
        self.post_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Typed envelope exchanged over a connection and through backing stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Application-defined payload
    #[serde(default)]
    pub content: serde_json::Value,

    /// Always overwritten by the server with the connection's identity
    #[serde(default)]
    pub from: String,

    /// Recipient; absent means broadcast
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub to: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub extra: MessageExtra,
}

/// Where an inbound message should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Deliver to one user
    Direct(&'a str),
    /// Deliver to every local connection
    Broadcast,
    /// Liveness only, nothing to deliver
    Heartbeat,
    /// Not routable from a client
    Ignore,
}

impl WireMessage {
    /// Create a message with the given kind and content.
    pub fn new(kind: MessageType, content: impl Into<serde_json::Value>) -> Self {
        Self {
            kind,
            content: content.into(),
            from: String::new(),
            to: None,
            created_at: Utc::now(),
            extra: MessageExtra::default(),
        }
    }

    /// Set the recipient.
    pub fn to(mut self, user_id: impl Into<String>) -> Self {
        self.to = Some(user_id.into());
        self
    }

    /// Set the related post id.
    pub fn with_post(mut self, post_id: impl Into<String>) -> Self {
        self.extra.post_id = Some(post_id.into());
        self
    }

    /// Stamp the authenticated sender and the receipt time.
    pub fn stamp(&mut self, sender: &str, now: DateTime<Utc>) {
        self.from = sender.to_string();
        self.created_at = now;
    }

    /// Decide how an inbound client message is routed.
    ///
    /// Post notifications need both a related post and a target; mentions
    /// only need a target.
    pub fn route(&self) -> Route<'_> {
        let target = self.to.as_deref();
        match self.kind {
            MessageType::Chat => match target {
                Some(to) => Route::Direct(to),
                None => Route::Broadcast,
            },
            kind if kind.is_post_notification() => match (self.extra.post_id(), target) {
                (Some(_), Some(to)) => Route::Direct(to),
                _ => Route::Ignore,
            },
            MessageType::Mention => target.map(Route::Direct).unwrap_or(Route::Ignore),
            MessageType::Heartbeat => Route::Heartbeat,
            _ => Route::Ignore,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn decode(json: &str) -> WireMessage {
        serde_json::from_str(json).expect("valid message")
    }

    #[test_case(r#"{"type":"chat","to":"bob"}"#, Route::Direct("bob") ; "chat with recipient")]
    #[test_case(r#"{"type":"chat"}"#, Route::Broadcast ; "chat without recipient")]
    #[test_case(r#"{"type":"chat","to":""}"#, Route::Broadcast ; "chat with empty recipient")]
    #[test_case(r#"{"type":"like","to":"bob","extra":{"postId":"p1"}}"#, Route::Direct("bob") ; "like on post")]
    #[test_case(r#"{"type":"like","to":"bob"}"#, Route::Ignore ; "like without post")]
    #[test_case(r#"{"type":"collect","extra":{"postId":"p1"}}"#, Route::Ignore ; "collect without target")]
    #[test_case(r#"{"type":"comment","to":"bob","extra":{"postId":"p1","commentId":"c1"}}"#, Route::Direct("bob") ; "comment on post")]
    #[test_case(r#"{"type":"mention","to":"carol"}"#, Route::Direct("carol") ; "mention")]
    #[test_case(r#"{"type":"mention"}"#, Route::Ignore ; "mention without target")]
    #[test_case(r#"{"type":"heartbeat"}"#, Route::Heartbeat ; "heartbeat")]
    #[test_case(r#"{"type":"ping"}"#, Route::Heartbeat ; "legacy ping")]
    #[test_case(r#"{"type":"system","to":"bob"}"#, Route::Ignore ; "system from client")]
    #[test_case(r#"{"type":"typing","to":"bob"}"#, Route::Ignore ; "unknown type")]
    fn test_route(json: &str, expected: Route<'static>) {
        assert_eq!(decode(json).route(), expected);
    }

    #[test]
    fn test_stamp_overwrites_client_sender() {
        let mut msg = decode(r#"{"type":"chat","from":"mallory","to":"bob","content":"hi"}"#);
        let now = Utc::now();
        msg.stamp("alice", now);

        assert_eq!(msg.from, "alice");
        assert_eq!(msg.created_at, now);
    }

    #[test]
    fn test_wire_field_names() {
        let msg = WireMessage::new(MessageType::Like, "liked your post")
            .to("bob")
            .with_post("p1");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "like");
        assert_eq!(value["to"], "bob");
        assert_eq!(value["extra"]["postId"], "p1");
        assert!(value.get("createdAt").is_some());
        assert!(value["extra"].get("commentId").is_none());
    }

    #[test]
    fn test_structured_content_is_opaque() {
        let msg = decode(r#"{"type":"chat","content":{"text":"hi","images":[1,2]}}"#);
        assert_eq!(msg.content["images"][1], 2);
    }
}
