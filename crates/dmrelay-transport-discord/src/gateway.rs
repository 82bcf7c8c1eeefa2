//! Discord implementation of [`ChatGateway`].
//!
//! Sends and history fetches go through
//! [`dmrelay_core::utils::retry_transport_operation`]; deletions are issued
//! once so a purge never hammers an already-failing message.

use dmrelay_core::gateway::{ChannelId, ChatGateway, GatewayError, HistoryMessage, MessageId};
use dmrelay_core::utils::retry_transport_operation;
use serenity::builder::GetMessages;
use serenity::http::Http;
use serenity::model::channel::{Message, MessageType};
use serenity::model::id::{ChannelId as DiscordChannelId, MessageId as DiscordMessageId};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Whether Discord lets the author delete a message of this kind.
///
/// System messages (pins, joins, boosts, ...) cannot be removed.
#[must_use]
pub fn is_deletable_kind(kind: MessageType) -> bool {
    matches!(kind, MessageType::Regular | MessageType::InlineReply)
}

fn to_history_message(message: &Message, self_id: u64) -> HistoryMessage {
    HistoryMessage {
        id: message.id.get(),
        authored_by_self: message.author.id.get() == self_id,
        deletable: is_deletable_kind(message.kind),
    }
}

/// `ChatGateway` over serenity's HTTP client.
pub struct DiscordGateway {
    http: Arc<Http>,
    self_id: OnceCell<u64>,
}

impl DiscordGateway {
    /// Wrap an HTTP client authenticated with the bot token.
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            self_id: OnceCell::new(),
        }
    }

    /// The bot's own user id, resolved on first use.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Transport` if the current user cannot be fetched.
    pub async fn self_id(&self) -> Result<u64, GatewayError> {
        self.self_id
            .get_or_try_init(|| async {
                let user = retry_transport_operation(|| async {
                    self.http
                        .get_current_user()
                        .await
                        .map_err(|e| anyhow::anyhow!("Discord current user error: {e}"))
                })
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
                debug!(bot_id = user.id.get(), "Resolved bot user id");
                Ok(user.id.get())
            })
            .await
            .copied()
    }
}

#[async_trait::async_trait]
impl ChatGateway for DiscordGateway {
    async fn send_message(
        &self,
        channel: ChannelId,
        text: &str,
    ) -> Result<MessageId, GatewayError> {
        let target = DiscordChannelId::new(channel);
        let sent = retry_transport_operation(|| async {
            target
                .say(self.http.as_ref(), text)
                .await
                .map_err(|e| anyhow::anyhow!("Discord send error: {e}"))
        })
        .await
        .map_err(|e| GatewayError::Send(e.to_string()))?;
        Ok(sent.id.get())
    }

    async fn fetch_messages(
        &self,
        channel: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<HistoryMessage>, GatewayError> {
        let self_id = self.self_id().await?;
        let target = DiscordChannelId::new(channel);

        let messages = retry_transport_operation(|| async {
            let mut builder = GetMessages::new().limit(limit.clamp(1, 100));
            if let Some(before_id) = before {
                builder = builder.before(DiscordMessageId::new(before_id));
            }
            target
                .messages(self.http.as_ref(), builder)
                .await
                .map_err(|e| anyhow::anyhow!("Discord fetch error: {e}"))
        })
        .await
        .map_err(|e| GatewayError::Fetch(e.to_string()))?;

        Ok(messages
            .iter()
            .map(|message| to_history_message(message, self_id))
            .collect())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        DiscordChannelId::new(channel)
            .delete_message(self.http.as_ref(), DiscordMessageId::new(message))
            .await
            .map_err(|e| GatewayError::Delete(e.to_string()))
    }

    async fn start_typing(&self, channel: ChannelId) -> Result<(), GatewayError> {
        self.http
            .broadcast_typing(DiscordChannelId::new(channel))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}
