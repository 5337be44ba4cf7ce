use serde::{Deserialize, Serialize};

use crate::types::ConversationId;
use crate::utils::text::{clean_text, truncate};

/// Longest title, in characters, sent along with a message.
pub const MAX_TITLE_CHARS: usize = 50;

/// Body of the send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The trimmed user message.
    pub message: String,

    /// Code of the model that should answer.
    #[serde(rename = "modelProvider")]
    pub model_provider: String,

    /// Conversation to continue; `null` starts a new one.
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<ConversationId>,

    /// Short title derived from the message.
    pub title: String,

    /// Identifies the client user to the backend.
    #[serde(rename = "userId")]
    pub user_id: String,
}

impl ChatRequest {
    /// Create a new `ChatRequest`, trimming the message and deriving its title.
    pub fn new(
        message: &str,
        model_provider: impl Into<String>,
        conversation_id: Option<ConversationId>,
        user_id: impl Into<String>,
    ) -> Self {
        let message = message.trim();
        Self {
            message: message.to_string(),
            model_provider: model_provider.into(),
            conversation_id,
            title: Self::title_for(message),
            user_id: user_id.into(),
        }
    }

    /// Derive a conversation title from a message.
    pub fn title_for(message: &str) -> String {
        truncate(&clean_text(message), MAX_TITLE_CHARS)
    }
}
