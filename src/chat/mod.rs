//! Chat session and terminal client support.
//!
//! # Architecture
//!
//! - [`session`]: the session state machine and its injected collaborators
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: slash command parsing for the terminal client
//! - [`render`]: turning session events into terminal output

pub mod clock;
mod commands;
mod config;
pub mod ids;
mod render;
pub mod session;

pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_LOG_LEVEL};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use render::{EventPrinter, PlainTextRenderer, Renderer};
pub use session::{
    ChatSession, DEFAULT_USER_ID, NO_RESPONSE_TEXT, SEND_FAILED_TEXT, STREAM_INTERRUPTED_TEXT,
    SendOutcome, SessionStats, SessionStatus,
};
