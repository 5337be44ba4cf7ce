//! Streaming chat session client.
//!
//! A [`ChatSession`] sends one message at a time to a chat backend and
//! assembles the streamed reply as it arrives, publishing every change as a
//! [`ChatEvent`]. The reply body is decoded by [`sse::LineDecoder`], which
//! accepts both the typed-event and generic `data:` framings the backend uses.

// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod events;
pub mod observability;
pub mod registry;
pub mod sse;
pub mod types;
pub mod utils;

// Re-exports
pub use chat::{ChatSession, SendOutcome, SessionStats, SessionStatus};
pub use client::{ByteStream, ChatClient, Transport};
pub use error::{Error, Result};
pub use events::{ChatEvent, EventBus, EventReceiver};
pub use observability::register_biometrics;
pub use registry::{ModelRegistry, RegistryLoadFailed, RegistryLoaded};
pub use sse::{LineDecoder, decode_stream};
pub use types::*;
