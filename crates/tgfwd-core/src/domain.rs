use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric, `-100...` for channels and supergroups).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric, strictly increasing within one chat).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One entry of a chat's history, as far as forwarding cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    /// Platform-generated message (member joined, pinned, title changed...).
    pub is_service: bool,
}

impl MessageRecord {
    pub fn content(id: i32) -> Self {
        Self {
            id: MessageId(id),
            is_service: false,
        }
    }

    pub fn service(id: i32) -> Self {
        Self {
            id: MessageId(id),
            is_service: true,
        }
    }
}

/// Bounded, ordered group of message ids forwarded as one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    ids: Vec<MessageId>,
    capacity: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ids.len() >= self.capacity
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.ids.last().copied()
    }

    /// Appends `id`; callers must check `is_full` first.
    pub(crate) fn push(&mut self, id: MessageId) {
        debug_assert!(!self.is_full());
        self.ids.push(id);
    }
}

/// Outcome of one accepted forward request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardResult {
    /// Ids of the copies created in the destination chat.
    pub forwarded: Vec<MessageId>,
}

/// Position of the run loop state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Scanning,
    BatchReady,
    Forwarding,
    Checkpointing,
    Delaying,
    Flushing,
    Done,
    /// Stopped during a delay, after the last window was checkpointed.
    Cancelled,
}

/// Accumulated progress of one run, returned for explicit merging into the
/// checkpoint store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub downloaded_ids: Vec<MessageId>,
    pub failed_ids: Vec<MessageId>,
    pub windows_forwarded: usize,
    pub state: RunState,
}

impl Default for RunResult {
    fn default() -> Self {
        Self {
            downloaded_ids: Vec::new(),
            failed_ids: Vec::new(),
            windows_forwarded: 0,
            state: RunState::Scanning,
        }
    }
}
