use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ConversationId;

/// Optional metadata carried by a completion marker.
///
/// Both dialects send completion markers with different fields; whatever is
/// present is kept, nothing is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMeta {
    /// Total tokens consumed by the exchange.
    #[serde(rename = "totalTokens", skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,

    /// Server-side id of the persisted reply.
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Server-side generation time in milliseconds.
    #[serde(rename = "responseTime", skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    /// Free-form status string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CompletionMeta {
    /// Pull the known fields out of a JSON object, ignoring anything malformed.
    pub fn from_json(value: &Value) -> Self {
        let text = |key: &str| match value.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            total_tokens: value.get("totalTokens").and_then(Value::as_u64),
            message_id: text("messageId"),
            response_time_ms: value.get("responseTime").and_then(Value::as_u64),
            status: text("status"),
        }
    }
}

/// A decoded unit from the response stream.
///
/// Produced by the stream decoder and consumed immediately by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Text to append to the open assistant message. May be empty.
    ContentDelta(String),

    /// The server assigned (or repeated) the conversation id.
    ConversationAssigned(ConversationId),

    /// Completion marker. Carries no content.
    Completed(CompletionMeta),

    /// The server reported a failure; the stream is aborted.
    Error(String),

    /// A well-formed frame the client has no use for.
    Unrecognized(String),
}
