use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the single exchange a session can have in flight.
///
/// `Completing` and `Error` are transitional: the session passes through them
/// on its way back to `Idle` and never rests there.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingState {
    /// Nothing in flight; ready for the next message.
    #[default]
    Idle,

    /// Request issued, no response bytes yet.
    Sending,

    /// Response body is arriving.
    Streaming,

    /// Body finished; the reply is being finalized.
    Completing,

    /// The exchange failed; the failure is being reported.
    Error,
}

impl StreamingState {
    /// Returns true while an assistant message is open for append.
    pub fn is_in_flight(self) -> bool {
        matches!(self, StreamingState::Sending | StreamingState::Streaming)
    }

    /// Returns true when a new exchange may start.
    pub fn is_idle(self) -> bool {
        self == StreamingState::Idle
    }
}

impl fmt::Display for StreamingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamingState::Idle => "idle",
            StreamingState::Sending => "sending",
            StreamingState::Streaming => "streaming",
            StreamingState::Completing => "completing",
            StreamingState::Error => "error",
        };
        f.write_str(name)
    }
}
