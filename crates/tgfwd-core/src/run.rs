//! The forwarding run loop.
//!
//! `SCANNING -> BATCH_READY -> FORWARDING -> CHECKPOINTING -> DELAYING -> SCANNING`
//! until the history stream ends, then `FLUSHING -> DONE` for a trailing window
//! (or straight to `DONE`). Exactly one forward request is in flight at a time
//! and the checkpoint is persisted before every delay.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    batcher::Batcher,
    checkpoint::CheckpointStore,
    domain::{ChatId, MessageId, RunResult, RunState, Window},
    ports::{Forwarder, HistorySource},
    rate_limit::{DelayKind, DelayOutcome, RateLimiter},
    Error, Result,
};

/// Everything a run needs besides the checkpoint.
pub struct RunContext<'a> {
    pub history: &'a dyn HistorySource,
    pub forwarder: &'a dyn Forwarder,
    pub rate_limiter: RateLimiter,
    pub source: ChatId,
    pub destination: ChatId,
}

/// Forward everything after the stored checkpoint, `capacity` ids per request.
///
/// Any history or forward error aborts the run immediately. The in-flight
/// window is then neither confirmed nor failed, and the last persisted
/// checkpoint is where the next run resumes.
pub async fn run(
    ctx: &RunContext<'_>,
    store: &mut CheckpointStore,
    capacity: usize,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    let mut pipeline = Pipeline {
        ctx,
        store,
        cancel,
        result: RunResult::default(),
    };
    pipeline.drive(capacity).await?;
    Ok(pipeline.result)
}

struct Pipeline<'a, 'b> {
    ctx: &'a RunContext<'b>,
    store: &'a mut CheckpointStore,
    cancel: &'a CancellationToken,
    result: RunResult,
}

impl Pipeline<'_, '_> {
    fn enter(&mut self, state: RunState) {
        debug!(from = ?self.result.state, to = ?state, "run state");
        self.result.state = state;
    }

    async fn drive(&mut self, capacity: usize) -> Result<()> {
        let mut batcher = Batcher::new(capacity)?;
        let offset = self.store.current().last_read_message_id;
        info!(
            source = self.ctx.source.0,
            destination = self.ctx.destination.0,
            offset = offset.0,
            capacity,
            "starting history scan"
        );

        let mut stream = self.ctx.history.iterate(self.ctx.source, offset).await?;
        let mut last_seen = offset;

        self.enter(RunState::Scanning);
        while let Some(record) = stream.next().await {
            let record = record?;
            if record.id <= last_seen {
                return Err(Error::Transport(format!(
                    "history out of order: {} after {}",
                    record.id, last_seen
                )));
            }
            last_seen = record.id;

            let Some(sealed) = batcher.admit(record) else {
                continue;
            };

            self.enter(RunState::BatchReady);
            let outcome = self
                .forward_window(&sealed.window, sealed.next_offset, DelayKind::FullBatch)
                .await?;
            if outcome == DelayOutcome::Cancelled {
                self.cancelled();
                return Ok(());
            }
            self.enter(RunState::Scanning);
        }

        if let Some(window) = batcher.flush() {
            self.enter(RunState::Flushing);
            let Some(last) = window.last_id() else {
                return Ok(());
            };
            // Resolved before forwarding so a window is never sent without a
            // checkpoint to record it.
            let next_offset = last.0.checked_add(1).map(MessageId).ok_or_else(|| {
                Error::Transport(format!("message id {last} leaves no resume offset"))
            })?;
            let outcome = self
                .forward_window(&window, next_offset, DelayKind::FinalBatch)
                .await?;
            if outcome == DelayOutcome::Cancelled {
                self.cancelled();
                return Ok(());
            }
        }

        self.enter(RunState::Done);
        info!(
            windows = self.result.windows_forwarded,
            forwarded = self.result.downloaded_ids.len(),
            checkpoint = self.store.current().last_read_message_id.0,
            "history exhausted"
        );
        Ok(())
    }

    async fn forward_window(
        &mut self,
        window: &Window,
        next_offset: MessageId,
        kind: DelayKind,
    ) -> Result<DelayOutcome> {
        self.enter(RunState::Forwarding);
        info!(
            first = window.ids().first().map(|id| id.0),
            last = window.last_id().map(|id| id.0),
            count = window.len(),
            "forwarding window"
        );
        let forwarded = self
            .ctx
            .forwarder
            .forward(self.ctx.destination, self.ctx.source, window)
            .await
            .map_err(|e| {
                error!(
                    checkpoint = self.store.current().last_read_message_id.0,
                    "forward failed, aborting run: {e}"
                );
                e
            })?;
        if forwarded.forwarded.len() != window.len() {
            warn!(
                requested = window.len(),
                accepted = forwarded.forwarded.len(),
                "destination accepted fewer messages than requested"
            );
        }

        self.enter(RunState::Checkpointing);
        let checkpoint = self.store.advance(next_offset, window.ids(), &[])?;
        self.result.downloaded_ids.extend_from_slice(window.ids());
        self.result.windows_forwarded += 1;
        info!(
            last_read_message_id = checkpoint.last_read_message_id.0,
            "updated last read message id"
        );

        self.enter(RunState::Delaying);
        Ok(self.ctx.rate_limiter.delay(kind, self.cancel).await)
    }

    fn cancelled(&mut self) {
        self.enter(RunState::Cancelled);
        warn!(
            checkpoint = self.store.current().last_read_message_id.0,
            "run cancelled during delay"
        );
    }
}
