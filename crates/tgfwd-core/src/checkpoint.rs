use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::{
    domain::{MessageId, RunResult},
    ports::CheckpointSink,
    Result,
};

/// Durable marker of forwarding progress.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// History is resumed strictly after this id.
    pub last_read_message_id: MessageId,
    pub ids_to_retry: BTreeSet<MessageId>,
}

/// Single-writer owner of the checkpoint.
///
/// Every mutation is persisted through the sink before the new value is
/// observable; a failed save leaves the in-memory checkpoint untouched.
pub struct CheckpointStore {
    current: Checkpoint,
    sink: Box<dyn CheckpointSink>,
}

impl CheckpointStore {
    pub fn new(initial: Checkpoint, sink: Box<dyn CheckpointSink>) -> Self {
        Self {
            current: initial,
            sink,
        }
    }

    pub fn current(&self) -> &Checkpoint {
        &self.current
    }

    /// Record a confirmed window and persist the result.
    ///
    /// `next_offset` is where the next run resumes from. The offset never moves
    /// backwards; a lower value is logged and ignored.
    pub fn advance(
        &mut self,
        next_offset: MessageId,
        confirmed: &[MessageId],
        failed: &[MessageId],
    ) -> Result<Checkpoint> {
        let mut next = self.current.clone();
        if next_offset < next.last_read_message_id {
            warn!(
                current = next.last_read_message_id.0,
                computed = next_offset.0,
                "checkpoint decrease refused"
            );
        } else {
            next.last_read_message_id = next_offset;
        }
        apply_retry_delta(&mut next.ids_to_retry, confirmed, failed);

        self.commit(next)
    }

    /// Fold a finished run's accumulated ids into the retry set and persist.
    pub fn merge(&mut self, result: &RunResult) -> Result<Checkpoint> {
        let mut next = self.current.clone();
        apply_retry_delta(
            &mut next.ids_to_retry,
            &result.downloaded_ids,
            &result.failed_ids,
        );
        self.commit(next)
    }

    fn commit(&mut self, next: Checkpoint) -> Result<Checkpoint> {
        self.sink.save(&next)?;
        debug!(
            last_read_message_id = next.last_read_message_id.0,
            retry = next.ids_to_retry.len(),
            "checkpoint persisted"
        );
        self.current = next;
        Ok(self.current.clone())
    }
}

fn apply_retry_delta(
    retry: &mut BTreeSet<MessageId>,
    confirmed: &[MessageId],
    failed: &[MessageId],
) {
    for id in confirmed {
        retry.remove(id);
    }
    retry.extend(failed.iter().copied());
}

/// In-memory sink that keeps every saved value.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    saves: std::sync::Arc<std::sync::Mutex<Vec<Checkpoint>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> Vec<Checkpoint> {
        self.saves
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Checkpoint> {
        self.saves().pop()
    }
}

impl CheckpointSink for MemorySink {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if let Ok(mut guard) = self.saves.lock() {
            guard.push(checkpoint.clone());
        }
        Ok(())
    }
}
