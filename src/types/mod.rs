// Public modules
pub mod chat_request;
pub mod conversation_id;
pub mod message;
pub mod model;
pub mod models_response;
pub mod protocol_event;
pub mod streaming_state;

// Re-exports
pub use chat_request::{ChatRequest, MAX_TITLE_CHARS};
pub use conversation_id::ConversationId;
pub use message::{Message, MessageId, Role};
pub use model::Model;
pub use models_response::ModelsResponse;
pub use protocol_event::{CompletionMeta, ProtocolEvent};
pub use streaming_state::StreamingState;
