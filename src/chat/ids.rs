use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::MessageId;

/// Source of unique message ids.
pub trait IdGenerator: Send + Sync {
    /// A fresh id, distinct from every id returned before.
    fn next_id(&self) -> MessageId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> MessageId {
        MessageId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// `msg-1`, `msg-2`, ...; predictable ids for tests and transcripts.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> MessageId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        MessageId::new(format!("msg-{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id().as_str(), "msg-1");
        assert_eq!(ids.next_id().as_str(), "msg-2");
    }

    #[test]
    fn uuid_ids_are_distinct() {
        assert_ne!(UuidIds.next_id(), UuidIds.next_id());
    }
}
