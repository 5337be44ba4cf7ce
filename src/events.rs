//! Session lifecycle events and their fan-out to observers.
//!
//! Events flow one way, from the session to observers. Every subscriber gets
//! every event published after it subscribed, in publish order.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::registry::ModelRegistry;
use crate::types::{ConversationId, Message};

/// Receiving half of a subscription.
pub type EventReceiver = UnboundedReceiver<ChatEvent>;

/// Something an observer of the session may want to render.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A registry was installed, fetched or built in.
    ModelsLoaded {
        /// The installed registry.
        registry: ModelRegistry,
        /// The model selected by the load.
        default_code: String,
    },

    /// The current model changed.
    ModelChanged {
        /// Code of the previously selected model.
        old_code: String,
        /// Code of the newly selected model.
        new_code: String,
        /// Display name of the newly selected model.
        new_name: String,
    },

    /// A message was appended to the conversation.
    MessageAdded {
        /// Snapshot of the message as added.
        message: Message,
    },

    /// The open assistant message changed; carries the full text, not a diff.
    ContentUpdated {
        /// Snapshot of the message after the change.
        message: Message,
    },

    /// The reply finished streaming.
    StreamComplete {
        /// The finished assistant message.
        message: Message,
        /// Conversation id after the exchange, if the server assigned one.
        conversation_id: Option<ConversationId>,
    },

    /// The in-flight exchange was stopped by the caller.
    StreamStopped,

    /// The conversation was cleared.
    ConversationCleared,

    /// The exchange failed.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl ChatEvent {
    /// Stable kebab-case name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::ModelsLoaded { .. } => "models-loaded",
            ChatEvent::ModelChanged { .. } => "model-changed",
            ChatEvent::MessageAdded { .. } => "message-added",
            ChatEvent::ContentUpdated { .. } => "content-updated",
            ChatEvent::StreamComplete { .. } => "stream-complete",
            ChatEvent::StreamStopped => "stream-stopped",
            ChatEvent::ConversationCleared => "conversation-cleared",
            ChatEvent::Error { .. } => "error",
        }
    }
}

/// Publish/subscribe hub for [`ChatEvent`]s.
///
/// Channels are unbounded so publishing never blocks the session. Dropped
/// receivers are pruned on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<ChatEvent>>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver an event to every live subscriber.
    pub fn publish(&self, event: ChatEvent) {
        tracing::trace!(event = event.name(), "publish");
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
