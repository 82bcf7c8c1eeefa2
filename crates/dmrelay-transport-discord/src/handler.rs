//! Serenity event handler.

use dmrelay_core::gateway::{ChannelKind, InboundMessage};
use dmrelay_core::router::MessageRouter;
use serenity::async_trait;
use serenity::client::{Context, EventHandler};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Direct messages carry no guild.
#[must_use]
pub fn channel_kind(guild_id: Option<GuildId>) -> ChannelKind {
    if guild_id.is_none() {
        ChannelKind::Direct
    } else {
        ChannelKind::Shared
    }
}

/// Translate a serenity message into the relay's inbound form.
#[must_use]
pub fn to_inbound(msg: &Message) -> InboundMessage {
    InboundMessage {
        author_id: msg.author.id.get(),
        author_is_bot: msg.author.bot,
        channel_id: msg.channel_id.get(),
        channel_kind: channel_kind(msg.guild_id),
        content: msg.content.clone(),
    }
}

/// Forwards every message event to the [`MessageRouter`].
pub struct Handler {
    router: Arc<MessageRouter>,
}

impl Handler {
    /// Create a handler bound to `router`.
    #[must_use]
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_id = ready.user.id.get(),
            "{} is connected to Discord", ready.user.name
        );
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let inbound = to_inbound(&msg);
        if !inbound.is_relayable() {
            return;
        }

        let outcome = self.router.handle(&inbound).await;
        match outcome.error_kind() {
            Some(kind) => {
                warn!(user_id = inbound.author_id, ?kind, "Message not fully handled");
            }
            None => {
                debug!(user_id = inbound.author_id, ?outcome, "Message handled");
            }
        }
    }
}
