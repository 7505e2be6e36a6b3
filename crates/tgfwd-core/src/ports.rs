use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{
    checkpoint::Checkpoint,
    domain::{ChatId, ForwardResult, MessageId, MessageRecord, Window},
    Result,
};

/// Lazy, ascending sequence of history records for one chat.
pub type HistoryStream = BoxStream<'static, Result<MessageRecord>>;

/// Hexagonal port for reading a chat's history oldest-first.
///
/// Implementations must yield strictly ascending ids, all greater than
/// `offset`. The stream ends at the newest message known when `iterate` was
/// called; calling again with a later offset resumes.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn iterate(&self, chat_id: ChatId, offset: MessageId) -> Result<HistoryStream>;
}

/// Hexagonal port for forwarding one window as a single request.
///
/// The call is atomic from the caller's view: either every id in `window` is
/// accepted or the whole call fails. Forwarded copies are content-protected.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        destination: ChatId,
        source: ChatId,
        window: &Window,
    ) -> Result<ForwardResult>;
}

/// Durable storage for the checkpoint. Each save replaces the previous value.
pub trait CheckpointSink: Send {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}
