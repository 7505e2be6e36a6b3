//! History source backed by a Telegram Desktop chat export (`result.json`).
//!
//! The Bot API cannot page through a chat's past messages, so history comes from
//! the JSON export ("Export chat history" -> machine-readable JSON). Only `id` and
//! `type` of each entry are read.

use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::{
    domain::{ChatId, MessageId, MessageRecord},
    ports::{HistorySource, HistoryStream},
    Error, Result,
};

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i32,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Clone, Debug)]
pub struct ExportHistorySource {
    path: PathBuf,
}

impl ExportHistorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse an export document into ascending, de-duplicated records after `offset`.
    pub fn parse(json: &str, offset: MessageId) -> Result<Vec<MessageRecord>> {
        let file: ExportFile = serde_json::from_str(json)?;
        let mut records: Vec<MessageRecord> = file
            .messages
            .into_iter()
            .filter(|m| m.id > offset.0)
            .map(|m| MessageRecord {
                id: MessageId(m.id),
                is_service: m.kind == "service",
            })
            .collect();
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);
        Ok(records)
    }
}

#[async_trait]
impl HistorySource for ExportHistorySource {
    async fn iterate(&self, chat_id: ChatId, offset: MessageId) -> Result<HistoryStream> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Transport(format!(
                "failed to read history export {}: {e}",
                self.path.display()
            ))
        })?;
        let records = Self::parse(&json, offset)?;
        debug!(
            chat_id = chat_id.0,
            offset = offset.0,
            records = records.len(),
            "history export loaded"
        );
        Ok(stream::iter(records.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    const EXPORT: &str = r#"{
        "name": "Archive",
        "type": "public_channel",
        "id": 1234567890,
        "messages": [
            {"id": 1, "type": "service", "action": "create_channel"},
            {"id": 2, "type": "message", "text": "hello"},
            {"id": 4, "type": "message", "text": ""},
            {"id": 3, "type": "message", "text": "out of order"},
            {"id": 5, "type": "service", "action": "pin_message"},
            {"id": 6, "type": "message", "text": "bye"}
        ]
    }"#;

    #[test]
    fn parse_sorts_and_flags_service_messages() {
        let records = ExportHistorySource::parse(EXPORT, MessageId(0)).unwrap();
        assert_eq!(
            records,
            vec![
                MessageRecord::service(1),
                MessageRecord::content(2),
                MessageRecord::content(3),
                MessageRecord::content(4),
                MessageRecord::service(5),
                MessageRecord::content(6),
            ]
        );
    }

    #[test]
    fn parse_starts_after_offset() {
        let records = ExportHistorySource::parse(EXPORT, MessageId(4)).unwrap();
        let ids: Vec<i32> = records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn malformed_export_is_a_json_error() {
        assert!(matches!(
            ExportHistorySource::parse("{\"messages\": 3}", MessageId(0)),
            Err(Error::Json(_))
        ));
    }

    #[tokio::test]
    async fn iterate_reads_from_disk_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, EXPORT).unwrap();
        let source = ExportHistorySource::new(&path);

        let first: Vec<MessageRecord> = source
            .iterate(ChatId(-1001234567890), MessageId(2))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 4);

        std::fs::write(&path, r#"{"messages": [{"id": 7, "type": "message"}]}"#).unwrap();
        let second: Vec<MessageRecord> = source
            .iterate(ChatId(-1001234567890), MessageId(6))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(second, vec![MessageRecord::content(7)]);
    }

    #[tokio::test]
    async fn missing_export_is_a_transport_error() {
        let source = ExportHistorySource::new("/nonexistent/result.json");
        assert!(matches!(
            source.iterate(ChatId(1), MessageId(0)).await,
            Err(Error::Transport(_))
        ));
    }
}
