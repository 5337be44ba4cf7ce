use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque unique token identifying a message within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new `MessageId`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing.
    User,

    /// The model's reply.
    Assistant,
}

/// One entry in the conversation.
///
/// The session owns every message. Observers receive snapshots through the
/// event bus and never write back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique id within the session.
    pub id: MessageId,

    /// Author of the message.
    pub role: Role,

    /// Text content; grows while the assistant reply streams in.
    pub content: String,

    /// Creation time; finalized to the completion time for assistant replies.
    #[serde(rename = "createdAt", with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// The model that produced the message. Only set for assistant messages.
    #[serde(rename = "modelCode", skip_serializing_if = "Option::is_none")]
    pub model_code: Option<String>,
}

impl Message {
    /// Create a user message.
    pub fn user(id: MessageId, content: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            created_at,
            model_code: None,
        }
    }

    /// Create an empty assistant message that is about to receive streamed content.
    pub fn assistant(
        id: MessageId,
        model_code: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            created_at,
            model_code: Some(model_code.into()),
        }
    }

    /// Returns true for assistant messages.
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn assistant_carries_model() {
        let message = Message::assistant(
            MessageId::new("m1"),
            "qianwen",
            datetime!(2025-01-02 03:04:05 UTC),
        );
        assert!(message.is_assistant());
        assert!(message.content.is_empty());
        assert_eq!(message.model_code.as_deref(), Some("qianwen"));
    }

    #[test]
    fn user_message_serialization() {
        let message = Message::user(
            MessageId::new("m0"),
            "hello",
            datetime!(2025-01-02 03:04:05 UTC),
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "m0",
                "role": "user",
                "content": "hello",
                "createdAt": "2025-01-02T03:04:05Z"
            })
        );
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }
}
