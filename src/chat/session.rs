//! Core chat session management.
//!
//! [`ChatSession`] owns the conversation: its id, the message list, the
//! selected model, and the single in-flight exchange. Observers learn about
//! every change through the session's [`EventBus`]; nothing outside the
//! session mutates its state.
//!
//! # State machine
//!
//! ```text
//! Idle --send--> Sending --first chunk--> Streaming --end--> Completing --> Idle
//!                   |                        |
//!                   +---- failure -----------+--> Error --> Idle
//!                   +---- stop --------------+--> Idle
//! ```
//!
//! `Completing` and `Error` are only ever observed by the exchange itself;
//! callers always see the session settle back to `Idle`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat::clock::{Clock, SystemClock};
use crate::chat::config::ChatConfig;
use crate::chat::ids::{IdGenerator, UuidIds};
use crate::client::{ChatClient, Transport};
use crate::events::{ChatEvent, EventBus, EventReceiver};
use crate::observability::{SESSION_EXCHANGES, SESSION_STOPPED, STREAM_DURATION, STREAM_TTFB};
use crate::registry::{ModelRegistry, RegistryLoadFailed, RegistryLoaded};
use crate::sse::LineDecoder;
use crate::types::{
    ChatRequest, CompletionMeta, ConversationId, Message, Model, ProtocolEvent, StreamingState,
};
use crate::{Error, Result};

/// User id sent when the caller does not pick one.
pub const DEFAULT_USER_ID: &str = "web-user";

/// Reply shown when a stream ends without any content.
pub const NO_RESPONSE_TEXT: &str = "I'm unable to respond right now. Please try again later.";

/// Reply shown when the request could not be sent or was rejected.
pub const SEND_FAILED_TEXT: &str = "Sorry, the message could not be sent. Please try again later.";

/// Reply shown when the stream broke off or the server reported an error.
pub const STREAM_INTERRUPTED_TEXT: &str =
    "An error occurred while receiving the response. Please try again.";

/// How an accepted exchange ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The reply streamed to completion.
    Completed(Message),
    /// The exchange was stopped before completion.
    Stopped,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    /// Models are loaded and no exchange is in flight.
    pub ready: bool,
    /// A registry has been installed.
    pub has_models: bool,
    /// Current streaming state.
    pub state: StreamingState,
    /// The selected model.
    pub current_model: Option<Model>,
    /// Server-assigned conversation id, if any.
    pub conversation_id: Option<ConversationId>,
    /// Number of messages in the conversation.
    pub message_count: usize,
}

/// Exchange counters for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Exchanges that streamed to completion.
    pub completed: u64,
    /// Exchanges that ended in an error.
    pub failed: u64,
    /// Exchanges stopped by the caller.
    pub stopped: u64,
    /// Metadata from the most recent completion marker.
    pub last_completion: Option<CompletionMeta>,
}

/// The one exchange allowed in flight.
#[derive(Debug)]
struct Exchange {
    serial: u64,
    message_index: usize,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct SessionState {
    registry: Option<ModelRegistry>,
    current_model: Option<String>,
    conversation_id: Option<ConversationId>,
    messages: Vec<Message>,
    state: StreamingState,
    // Some exactly when `state` is Sending or Streaming.
    exchange: Option<Exchange>,
    next_serial: u64,
    stats: SessionStats,
}

impl SessionState {
    fn is_current(&self, serial: u64) -> bool {
        self.exchange.as_ref().is_some_and(|x| x.serial == serial)
    }

    fn transition(&mut self, to: StreamingState) {
        tracing::debug!(from = %self.state, to = %to, "session state");
        self.state = to;
    }

    fn open_message(&mut self) -> Option<&mut Message> {
        let index = self.exchange.as_ref()?.message_index;
        self.messages.get_mut(index)
    }
}

enum Applied {
    Continue,
    Stale,
    Failed(String),
}

/// A chat session bound to one backend.
pub struct ChatSession {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    user_id: String,
    bus: EventBus,
    inner: Mutex<SessionState>,
}

impl ChatSession {
    /// Create a session with explicit collaborators.
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            transport,
            clock,
            ids,
            user_id: DEFAULT_USER_ID.to_string(),
            bus: EventBus::new(),
            inner: Mutex::new(SessionState::default()),
        }
    }

    /// Create a session using the system clock and random message ids.
    pub fn with_defaults(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, Arc::new(SystemClock), Arc::new(UuidIds))
    }

    /// Create a session that talks HTTP to the configured backend.
    pub fn connect(config: &ChatConfig) -> Result<Self> {
        let client = ChatClient::with_options(Some(config.base_url.clone()), config.request_timeout)?;
        Ok(Self::with_defaults(Arc::new(client)).with_user_id(config.user_id.clone()))
    }

    /// Set the user id sent with every message.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer. It sees every event published from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Fetch the model registry and select its default model.
    ///
    /// Whatever the outcome, a registry is installed and `ModelsLoaded` fires
    /// once. The error arm reports that the built-in models were used.
    pub async fn load_models(&self) -> std::result::Result<RegistryLoaded, RegistryLoadFailed> {
        let result = ModelRegistry::load(self.transport.as_ref()).await;
        let registry = match &result {
            Ok(loaded) => loaded.registry.clone(),
            Err(failed) => failed.registry.clone(),
        };
        let default_code = registry.default_code().to_string();
        let mut inner = self.lock();
        inner.registry = Some(registry.clone());
        inner.current_model = Some(default_code.clone());
        self.bus.publish(ChatEvent::ModelsLoaded {
            registry,
            default_code,
        });
        result
    }

    /// Select the model that answers the next message.
    ///
    /// The conversation is kept. Allowed while an exchange is in flight; the
    /// in-flight request keeps the model it was sent with. A rejected
    /// selection is also published as an error event.
    pub fn set_current_model(&self, code: &str) -> Result<()> {
        let mut inner = self.lock();
        let selected = match inner.registry.as_ref() {
            Some(registry) => registry
                .get(code)
                .cloned()
                .ok_or_else(|| Error::unknown_model(code)),
            None => Err(Error::NotReady),
        };
        let model = match selected {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!(code = %code, error = %err, "model selection rejected");
                self.bus.publish(ChatEvent::Error {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };
        let old_code = inner.current_model.replace(model.code.clone()).unwrap_or_default();
        tracing::info!(old = %old_code, new = %model.code, "model changed");
        self.bus.publish(ChatEvent::ModelChanged {
            old_code,
            new_code: model.code,
            new_name: model.display_name,
        });
        Ok(())
    }

    /// Send a message and stream the reply into the conversation.
    ///
    /// Fails without side effects on an empty message, while another
    /// exchange is in flight, or before models are loaded. Once accepted, the
    /// exchange always settles the session back to idle: on success the
    /// finished reply is returned, on failure the reply is replaced with a
    /// fixed notice and the error is returned.
    ///
    /// Dropping the returned future stops the exchange.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }
        let (request, serial, cancel) = self.begin_exchange(text)?;
        let mut guard = ExchangeGuard {
            session: self,
            serial,
            armed: true,
        };
        let result = self.run_exchange(&request, serial, &cancel).await;
        guard.armed = false;
        result
    }

    fn begin_exchange(&self, text: &str) -> Result<(ChatRequest, u64, CancellationToken)> {
        let mut inner = self.lock();
        if !inner.state.is_idle() {
            return Err(Error::Busy);
        }
        let (Some(_), Some(model_code)) = (inner.registry.as_ref(), inner.current_model.clone())
        else {
            return Err(Error::NotReady);
        };

        let now = self.clock.now();
        let user = Message::user(self.ids.next_id(), text, now);
        let assistant = Message::assistant(self.ids.next_id(), model_code.clone(), now);
        let request = ChatRequest::new(
            text,
            model_code,
            inner.conversation_id.clone(),
            self.user_id.clone(),
        );

        inner.messages.push(user.clone());
        self.bus.publish(ChatEvent::MessageAdded { message: user });
        inner.messages.push(assistant.clone());
        self.bus.publish(ChatEvent::MessageAdded { message: assistant });

        inner.next_serial += 1;
        let serial = inner.next_serial;
        let message_index = inner.messages.len() - 1;
        let cancel = CancellationToken::new();
        inner.exchange = Some(Exchange {
            serial,
            message_index,
            cancel: cancel.clone(),
        });
        inner.transition(StreamingState::Sending);
        SESSION_EXCHANGES.click();
        Ok((request, serial, cancel))
    }

    async fn run_exchange(
        &self,
        request: &ChatRequest,
        serial: u64,
        cancel: &CancellationToken,
    ) -> Result<SendOutcome> {
        let start = Instant::now();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SendOutcome::Stopped),
            sent = self.transport.send(request) => sent,
        };
        let mut body = match sent {
            Ok(body) => body,
            Err(err) => return self.fail_exchange(serial, err, SEND_FAILED_TEXT),
        };

        let mut decoder = LineDecoder::new();
        let mut first_chunk = true;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SendOutcome::Stopped),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    if first_chunk {
                        first_chunk = false;
                        STREAM_TTFB.add(start.elapsed().as_secs_f64());
                    }
                    let events = decoder.push(&bytes);
                    match self.apply_events(serial, events) {
                        Applied::Continue => {}
                        Applied::Stale => return Ok(SendOutcome::Stopped),
                        Applied::Failed(message) => {
                            return self.fail_exchange(
                                serial,
                                Error::protocol(message),
                                STREAM_INTERRUPTED_TEXT,
                            );
                        }
                    }
                }
                Some(Err(err)) => return self.fail_exchange(serial, err, STREAM_INTERRUPTED_TEXT),
                None => break,
            }
        }
        drop(body);

        match self.apply_events(serial, decoder.finish()) {
            Applied::Continue => {}
            Applied::Stale => return Ok(SendOutcome::Stopped),
            Applied::Failed(message) => {
                return self.fail_exchange(
                    serial,
                    Error::protocol(message),
                    STREAM_INTERRUPTED_TEXT,
                );
            }
        }
        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        Ok(self.complete_exchange(serial))
    }

    /// Apply decoded events to the open message, in order.
    fn apply_events(&self, serial: u64, events: Vec<ProtocolEvent>) -> Applied {
        let mut inner = self.lock();
        if !inner.is_current(serial) {
            return Applied::Stale;
        }
        if inner.state == StreamingState::Sending {
            inner.transition(StreamingState::Streaming);
        }
        for event in events {
            match event {
                ProtocolEvent::ContentDelta(text) => {
                    if let Some(message) = inner.open_message() {
                        message.content.push_str(&text);
                        let message = message.clone();
                        self.bus.publish(ChatEvent::ContentUpdated { message });
                    }
                }
                ProtocolEvent::ConversationAssigned(id) => match inner.conversation_id.clone() {
                    None => {
                        tracing::info!(conversation_id = %id, "conversation assigned");
                        inner.conversation_id = Some(id);
                    }
                    Some(existing) if existing != id => {
                        tracing::debug!(
                            current = %existing,
                            ignored = %id,
                            "ignoring conversation reassignment"
                        );
                    }
                    Some(_) => {}
                },
                ProtocolEvent::Completed(meta) => {
                    tracing::debug!(?meta, "completion marker");
                    inner.stats.last_completion = Some(meta);
                }
                ProtocolEvent::Error(message) => return Applied::Failed(message),
                ProtocolEvent::Unrecognized(raw) => {
                    tracing::debug!(raw = %raw, "ignoring unrecognized stream event");
                }
            }
        }
        Applied::Continue
    }

    fn complete_exchange(&self, serial: u64) -> SendOutcome {
        let mut inner = self.lock();
        if !inner.is_current(serial) {
            return SendOutcome::Stopped;
        }
        inner.transition(StreamingState::Completing);
        let now = self.clock.now();
        let mut replaced = false;
        let message = match inner.open_message() {
            Some(message) => {
                if message.content.trim().is_empty() {
                    message.content = NO_RESPONSE_TEXT.to_string();
                    replaced = true;
                }
                message.created_at = now;
                message.clone()
            }
            None => return SendOutcome::Stopped,
        };
        if replaced {
            self.bus.publish(ChatEvent::ContentUpdated {
                message: message.clone(),
            });
        }
        inner.exchange = None;
        inner.stats.completed += 1;
        self.bus.publish(ChatEvent::StreamComplete {
            message: message.clone(),
            conversation_id: inner.conversation_id.clone(),
        });
        inner.transition(StreamingState::Idle);
        SendOutcome::Completed(message)
    }

    fn fail_exchange(&self, serial: u64, err: Error, notice: &str) -> Result<SendOutcome> {
        let mut inner = self.lock();
        if !inner.is_current(serial) {
            return Ok(SendOutcome::Stopped);
        }
        tracing::warn!(error = %err, "exchange failed");
        inner.transition(StreamingState::Error);
        if let Some(message) = inner.open_message() {
            message.content = notice.to_string();
            let message = message.clone();
            self.bus.publish(ChatEvent::ContentUpdated { message });
        }
        inner.exchange = None;
        inner.stats.failed += 1;
        self.bus.publish(ChatEvent::Error {
            message: err.to_string(),
        });
        inner.transition(StreamingState::Idle);
        Err(err)
    }

    /// Stop the in-flight exchange, keeping whatever content already arrived.
    ///
    /// Returns false, and does nothing, when no exchange is in flight.
    pub fn stop_streaming(&self) -> bool {
        let mut inner = self.lock();
        self.stop_locked(&mut inner, None)
    }

    fn stop_locked(&self, inner: &mut SessionState, serial: Option<u64>) -> bool {
        if !inner.state.is_in_flight() {
            return false;
        }
        if serial.is_some_and(|serial| !inner.is_current(serial)) {
            return false;
        }
        let Some(exchange) = inner.exchange.take() else {
            return false;
        };
        exchange.cancel.cancel();
        tracing::info!(state = %inner.state, "stopping exchange");
        inner.stats.stopped += 1;
        SESSION_STOPPED.click();
        self.bus.publish(ChatEvent::StreamStopped);
        inner.transition(StreamingState::Idle);
        true
    }

    /// Start a new conversation.
    ///
    /// Local state is cleared unconditionally; the backend is then asked to
    /// forget the old conversation, and a failure there is only logged.
    pub async fn clear_conversation(&self) -> Result<()> {
        let previous = {
            let mut inner = self.lock();
            if !inner.state.is_idle() {
                return Err(Error::Busy);
            }
            inner.messages.clear();
            let previous = inner.conversation_id.take();
            self.bus.publish(ChatEvent::ConversationCleared);
            previous
        };
        if let Some(id) = previous
            && let Err(err) = self.transport.clear_conversation(&id).await
        {
            tracing::warn!(conversation_id = %id, error = %err, "failed to clear server history");
        }
        Ok(())
    }

    /// The current streaming state.
    pub fn state(&self) -> StreamingState {
        self.lock().state
    }

    /// Returns true once models are loaded and no exchange is in flight.
    pub fn is_ready(&self) -> bool {
        let inner = self.lock();
        inner.registry.is_some() && inner.state.is_idle()
    }

    /// The server-assigned conversation id.
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.lock().conversation_id.clone()
    }

    /// Snapshot of the conversation so far.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// The selected model, once models are loaded.
    pub fn current_model(&self) -> Option<Model> {
        let inner = self.lock();
        let code = inner.current_model.as_deref()?;
        inner.registry.as_ref()?.get(code).cloned()
    }

    /// Available models in server order; empty before models are loaded.
    pub fn models(&self) -> Vec<Model> {
        self.lock()
            .registry
            .as_ref()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of readiness, state, and conversation size.
    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        let current_model = inner
            .current_model
            .as_deref()
            .and_then(|code| inner.registry.as_ref()?.get(code).cloned());
        SessionStatus {
            ready: inner.registry.is_some() && inner.state.is_idle(),
            has_models: inner.registry.is_some(),
            state: inner.state,
            current_model,
            conversation_id: inner.conversation_id.clone(),
            message_count: inner.messages.len(),
        }
    }

    /// Exchange counters.
    pub fn stats(&self) -> SessionStats {
        self.lock().stats.clone()
    }

    /// User id sent with each message.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Releases the exchange if the send future is dropped mid-flight.
struct ExchangeGuard<'a> {
    session: &'a ChatSession,
    serial: u64,
    armed: bool,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.session.lock();
            if self.session.stop_locked(&mut inner, Some(self.serial)) {
                tracing::debug!("send future dropped; exchange stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::clock::FixedClock;
    use crate::chat::ids::SequentialIds;
    use crate::client::ByteStream;
    use crate::types::{ModelsResponse, Role};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use serde_json::json;
    use time::macros::datetime;

    struct OneShot {
        body: Vec<&'static [u8]>,
    }

    #[async_trait]
    impl Transport for OneShot {
        async fn fetch_models(&self) -> Result<ModelsResponse> {
            Ok(serde_json::from_value(json!({
                "success": true,
                "models": {"qianwen": "Alibaba Qianwen", "deepseek": "DeepSeek"}
            }))
            .unwrap())
        }

        async fn send(&self, _: &ChatRequest) -> Result<ByteStream> {
            let chunks: Vec<Result<Bytes>> = self
                .body
                .iter()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }

        async fn clear_conversation(&self, _: &ConversationId) -> Result<()> {
            Ok(())
        }
    }

    fn session(body: Vec<&'static [u8]>) -> ChatSession {
        ChatSession::new(
            Arc::new(OneShot { body }),
            Arc::new(FixedClock(datetime!(2025-03-04 05:06:07 UTC))),
            Arc::new(SequentialIds::new()),
        )
    }

    #[tokio::test]
    async fn not_ready_before_models() {
        let session = session(vec![]);
        assert!(session.send_message("hi").await.unwrap_err().is_not_ready());
        assert!(session.set_current_model("qianwen").unwrap_err().is_not_ready());
        assert!(session.messages().is_empty());
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn empty_message_is_rejected_first() {
        let session = session(vec![]);
        assert!(session.send_message("  \n\t").await.unwrap_err().is_empty_message());
        assert_eq!(session.state(), StreamingState::Idle);
    }

    #[tokio::test]
    async fn completed_exchange() {
        let session = session(vec![
            b"event:conversation\ndata:{\"conversationId\":5}\n",
            b"event:ai_chunk\ndata:{\"chunk\":\"Hel\"}\nevent:ai_",
            b"chunk\ndata:{\"chunk\":\"lo\"}\n",
        ]);
        session.load_models().await.unwrap();
        let outcome = session.send_message("  hi  ").await.unwrap();
        let SendOutcome::Completed(reply) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.model_code.as_deref(), Some("qianwen"));
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1], reply);
        assert_eq!(session.conversation_id(), Some(ConversationId::new("5")));
        assert_eq!(session.state(), StreamingState::Idle);
        assert_eq!(session.stats().completed, 1);
    }

    #[tokio::test]
    async fn status_snapshot() {
        let session = session(vec![]);
        let status = session.status();
        assert!(!status.ready);
        assert!(!status.has_models);
        session.load_models().await.unwrap();
        session.set_current_model("deepseek").unwrap();
        let status = session.status();
        assert!(status.ready);
        assert_eq!(status.current_model, Some(Model::new("deepseek", "DeepSeek")));
        assert_eq!(status.message_count, 0);
        assert_eq!(session.models().len(), 2);
    }

    #[tokio::test]
    async fn stop_without_exchange_is_a_no_op() {
        let session = session(vec![]);
        let mut events = session.subscribe();
        assert!(!session.stop_streaming());
        assert!(events.try_recv().is_err());
    }
}
