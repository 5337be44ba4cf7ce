//! Line-oriented decoding of streamed chat responses.
//!
//! The response body is a sequence of text lines in one of two dialects, and
//! the dialect is decided line by line rather than per stream:
//!
//! - Typed-event: an `event:<type>` line names the type of the next `data:`
//!   line. Only `ai_chunk` carries content (`{"chunk": "..."}`). The type is
//!   consumed by exactly one data line.
//! - Generic: `data: {"type": ...}` lines whose JSON discriminator selects
//!   content, conversation assignment, completion, or error. Payloads that are
//!   not JSON are treated as literal text, and `data: [DONE]` is a no-op.
//!
//! Anything else that is not blank and not a `:` comment is appended as text.
//! Chunk boundaries never matter: bytes are buffered until a newline arrives,
//! so every segmentation of the same body decodes to the same events.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::observability::{STREAM_EVENTS, STREAM_MALFORMED_LINES};
use crate::types::{CompletionMeta, ConversationId, ProtocolEvent};
use crate::Result;

/// Event type whose data lines carry reply content in the typed-event dialect.
pub const CONTENT_EVENT_TYPE: &str = "ai_chunk";

/// Typed event announcing the conversation id.
pub const CONVERSATION_EVENT_TYPE: &str = "conversation";

/// Typed event marking the end of generation.
pub const COMPLETE_EVENT_TYPE: &str = "complete";

/// Typed event reporting a server-side failure.
pub const ERROR_EVENT_TYPE: &str = "error";

/// Bare end-of-stream sentinel in the generic dialect.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Fallback text for error events that carry no message.
const UNSPECIFIED_ERROR: &str = "the server reported an error";

/// Classification of a single line, before any dialect state is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Empty or whitespace-only.
    Blank,
    /// Starts with `:`.
    Comment,
    /// `event:` line; holds the trimmed type.
    EventType(&'a str),
    /// `data:` line; holds everything after the colon, untrimmed.
    Data(&'a str),
    /// Anything else.
    Text(&'a str),
}

/// Classify one line. A trailing `\r` is ignored.
pub fn classify_line(line: &str) -> LineKind<'_> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let trimmed = line.trim_start();
    if trimmed.trim_end().is_empty() {
        LineKind::Blank
    } else if trimmed.starts_with(':') {
        LineKind::Comment
    } else if let Some(event_type) = trimmed.strip_prefix("event:") {
        LineKind::EventType(event_type.trim())
    } else if let Some(payload) = trimmed.strip_prefix("data:") {
        LineKind::Data(payload)
    } else {
        LineKind::Text(line)
    }
}

/// Incremental decoder from byte chunks to protocol events.
///
/// The decoder does no I/O. Feed it chunks with [`LineDecoder::push`] as they
/// arrive, then call [`LineDecoder::finish`] once the transport reports the
/// end of the body.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    pending_event: Option<String>,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        events
    }

    /// Decode whatever partial line is still buffered.
    ///
    /// A dangling `event:` line with no data line after it is dropped.
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        if !rest.is_empty() {
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        if let Some(event_type) = self.pending_event.take() {
            tracing::debug!(event_type = %event_type, "stream ended after event line without data");
        }
        events
    }

    /// Number of bytes waiting for a newline.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Decode one complete line.
    pub fn decode_line(&mut self, line: &str) -> Option<ProtocolEvent> {
        let event = match classify_line(line) {
            LineKind::Blank | LineKind::Comment => None,
            LineKind::EventType(event_type) => {
                self.pending_event = Some(event_type.to_string());
                None
            }
            LineKind::Data(payload) => match self.pending_event.take() {
                Some(event_type) => decode_typed(&event_type, payload.trim()),
                None => decode_generic(payload),
            },
            LineKind::Text(text) => Some(ProtocolEvent::ContentDelta(format!("{text}\n"))),
        };
        if event.is_some() {
            STREAM_EVENTS.click();
        }
        event
    }
}

/// Decode the data line of a typed event.
fn decode_typed(event_type: &str, payload: &str) -> Option<ProtocolEvent> {
    let parsed = serde_json::from_str::<Value>(payload);
    match event_type {
        CONTENT_EVENT_TYPE => match parsed {
            Ok(value) => match value.get("chunk") {
                Some(Value::String(chunk)) => Some(ProtocolEvent::ContentDelta(chunk.clone())),
                Some(Value::Null) | None => None,
                Some(other) => Some(ProtocolEvent::ContentDelta(other.to_string())),
            },
            Err(err) => {
                STREAM_MALFORMED_LINES.click();
                tracing::warn!(payload, error = %err, "skipping malformed ai_chunk data");
                None
            }
        },
        CONVERSATION_EVENT_TYPE => match parsed {
            Ok(value) => value
                .get("conversationId")
                .and_then(ConversationId::from_json)
                .map(ProtocolEvent::ConversationAssigned),
            Err(err) => {
                STREAM_MALFORMED_LINES.click();
                tracing::warn!(payload, error = %err, "skipping malformed conversation data");
                None
            }
        },
        COMPLETE_EVENT_TYPE => Some(ProtocolEvent::Completed(
            parsed
                .map(|value| CompletionMeta::from_json(&value))
                .unwrap_or_default(),
        )),
        ERROR_EVENT_TYPE => Some(ProtocolEvent::Error(match parsed {
            Ok(value) => error_message(&value).unwrap_or_else(|| payload.to_string()),
            Err(_) if !payload.is_empty() => payload.to_string(),
            Err(_) => UNSPECIFIED_ERROR.to_string(),
        })),
        _ => Some(ProtocolEvent::Unrecognized(format!(
            "event:{event_type} data:{payload}"
        ))),
    }
}

/// Decode a `data:` line that no `event:` line claimed.
///
/// A payload that is not JSON is literal text and keeps its line break.
fn decode_generic(payload: &str) -> Option<ProtocolEvent> {
    // The generic dialect always writes `data: `; a bare `data:` here is a
    // typed-event data line whose event line never arrived.
    let Some(payload) = payload.strip_prefix(' ') else {
        return Some(ProtocolEvent::Unrecognized(format!("data:{payload}")));
    };
    if payload.trim() == DONE_SENTINEL {
        return None;
    }
    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(_) => return Some(ProtocolEvent::ContentDelta(format!("{payload}\n"))),
    };
    let event = match value.get("type").and_then(Value::as_str) {
        Some("content") => ProtocolEvent::ContentDelta(
            value
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some("conversation") => match value.get("conversationId").and_then(ConversationId::from_json) {
            Some(id) => ProtocolEvent::ConversationAssigned(id),
            None => ProtocolEvent::Unrecognized(payload.to_string()),
        },
        Some("complete") => ProtocolEvent::Completed(CompletionMeta::from_json(&value)),
        Some("error") => ProtocolEvent::Error(
            error_message(&value).unwrap_or_else(|| UNSPECIFIED_ERROR.to_string()),
        ),
        _ => ProtocolEvent::Unrecognized(payload.to_string()),
    };
    Some(event)
}

fn error_message(value: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|message| !message.trim().is_empty())
        .map(str::to_string)
}

/// Decode a byte stream into a stream of protocol events.
///
/// Transport errors are passed through and end the stream. After the byte
/// stream ends, the buffered partial line is flushed before the event stream
/// ends.
pub fn decode_stream<S>(byte_stream: S) -> impl Stream<Item = Result<ProtocolEvent>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let ready: std::collections::VecDeque<ProtocolEvent> = Default::default();
    stream::unfold(
        (byte_stream, LineDecoder::new(), ready, false),
        |(mut byte_stream, mut decoder, mut ready, mut done)| async move {
            loop {
                if let Some(event) = ready.pop_front() {
                    return Some((Ok(event), (byte_stream, decoder, ready, done)));
                }
                if done {
                    return None;
                }
                match byte_stream.next().await {
                    Some(Ok(bytes)) => ready.extend(decoder.push(&bytes)),
                    Some(Err(err)) => {
                        done = true;
                        return Some((Err(err), (byte_stream, decoder, ready, done)));
                    }
                    None => {
                        done = true;
                        ready.extend(decoder.finish());
                    }
                }
            }
        },
    )
}
