//! Telegram adapter (teloxide).
//!
//! Implements the `tgfwd-core` Forwarder port over the Bot API
//! `forwardMessages` method. The bot must be a member of both chats, with
//! read access to the source.

use async_trait::async_trait;
use teloxide::prelude::*;
use tokio::time::sleep;
use tracing::{info, warn};

use tgfwd_core::{
    config::MAX_PAGINATION_LIMIT,
    domain::{ChatId, ForwardResult, MessageId, Window},
    errors::Error,
    ports::Forwarder,
    Result,
};

#[derive(Clone)]
pub struct TelegramForwarder {
    bot: Bot,
    /// How many `RetryAfter` responses are absorbed per window before giving up.
    max_retries: usize,
}

impl TelegramForwarder {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            max_retries: 1,
        }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    /// Confirm the bot can see both chats before the run starts.
    pub async fn verify_chats(&self, source: ChatId, destination: ChatId) -> Result<()> {
        if let Ok(me) = self.bot.get_me().await {
            info!(bot = %me.username(), "telegram bot authorized");
        }
        for (role, chat_id) in [("source", source), ("destination", destination)] {
            self.bot
                .get_chat(Self::tg_chat(chat_id))
                .await
                .map_err(|e| {
                    Error::Config(format!("{role} chat {} unreachable: {e}", chat_id.0))
                })?;
        }
        Ok(())
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(secs)) => {
                    let wait = secs.duration();
                    if attempts >= self.max_retries {
                        return Err(Error::RateLimited { retry_after: wait });
                    }
                    attempts += 1;
                    warn!(
                        secs = wait.as_secs(),
                        "telegram flood wait outside the fixed schedule, retrying once"
                    );
                    sleep(wait).await;
                }
                Err(other) => return Err(map_err(other)),
            }
        }
    }
}

fn map_err(e: teloxide::RequestError) -> Error {
    match e {
        teloxide::RequestError::RetryAfter(secs) => Error::RateLimited {
            retry_after: secs.duration(),
        },
        teloxide::RequestError::Api(api) => Error::Transport(format!("telegram api error: {api}")),
        other => Error::Transport(format!("telegram error: {other}")),
    }
}

/// Reject windows the Bot API would refuse, before sending anything.
fn check_window(window: &Window) -> Result<()> {
    if window.is_empty() {
        return Err(Error::Config("refusing to forward an empty window".to_string()));
    }
    if window.len() > MAX_PAGINATION_LIMIT {
        return Err(Error::Config(format!(
            "window of {} messages exceeds the {MAX_PAGINATION_LIMIT} message limit",
            window.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl Forwarder for TelegramForwarder {
    async fn forward(
        &self,
        destination: ChatId,
        source: ChatId,
        window: &Window,
    ) -> Result<ForwardResult> {
        check_window(window)?;
        let ids: Vec<teloxide::types::MessageId> =
            window.ids().iter().copied().map(Self::tg_msg_id).collect();

        let forwarded = self
            .with_retry(|| {
                self.bot
                    .forward_messages(
                        Self::tg_chat(destination),
                        Self::tg_chat(source),
                        ids.clone(),
                    )
                    .protect_content(true)
            })
            .await?;

        Ok(ForwardResult {
            forwarded: forwarded.into_iter().map(|m| MessageId(m.0)).collect(),
        })
    }
}
