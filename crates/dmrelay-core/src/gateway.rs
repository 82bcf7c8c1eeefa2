//! Chat gateway seam
//!
//! The relay never talks to a chat platform directly. Transports implement
//! [`ChatGateway`] and translate their native events into [`InboundMessage`].

use thiserror::Error;

/// Platform user identifier.
pub type UserId = u64;
/// Platform channel identifier.
pub type ChannelId = u64;
/// Platform message identifier.
pub type MessageId = u64;

/// Errors surfaced by a gateway implementation
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Sending a message failed
    #[error("send failed: {0}")]
    Send(String),
    /// Fetching channel history failed
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// Deleting a message failed
    #[error("delete failed: {0}")]
    Delete(String),
    /// Any other transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Kind of channel an inbound message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// One-to-one session between the bot and a single user
    Direct,
    /// Guild, group or any shared channel
    Shared,
}

/// A message received from the platform.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Author's user id
    pub author_id: UserId,
    /// Whether the author is a bot account
    pub author_is_bot: bool,
    /// Channel the message was posted in
    pub channel_id: ChannelId,
    /// Direct or shared channel
    pub channel_kind: ChannelKind,
    /// Raw text content
    pub content: String,
}

impl InboundMessage {
    /// Whether the relay should react to this message at all.
    #[must_use]
    pub fn is_relayable(&self) -> bool {
        !self.author_is_bot && self.channel_kind == ChannelKind::Direct
    }
}

/// One entry of a fetched history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Message id
    pub id: MessageId,
    /// Authored by the bot account itself
    pub authored_by_self: bool,
    /// Whether the platform allows deleting it
    pub deletable: bool,
}

/// Outbound side of a chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send `text` to `channel` as one plain-text message.
    async fn send_message(&self, channel: ChannelId, text: &str)
        -> Result<MessageId, GatewayError>;

    /// Fetch up to `limit` messages, newest first, optionally older than `before`.
    async fn fetch_messages(
        &self,
        channel: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<HistoryMessage>, GatewayError>;

    /// Delete one message.
    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), GatewayError>;

    /// Show a typing indicator in `channel`.
    async fn start_typing(&self, channel: ChannelId) -> Result<(), GatewayError>;
}
