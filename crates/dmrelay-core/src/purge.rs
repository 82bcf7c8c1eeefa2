//! Bot message history purge
//!
//! Walks a DM channel page by page (newest first) and deletes every
//! deletable message the bot authored, pausing between deletions to stay
//! under platform rate limits.

use crate::config::RelaySettings;
use crate::gateway::{ChannelId, ChatGateway, GatewayError, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Deletes the bot's own messages from a channel.
pub struct HistoryPurge {
    gateway: Arc<dyn ChatGateway>,
    page_size: u8,
    delete_delay: Duration,
}

impl HistoryPurge {
    /// Create a purge with an explicit page size and inter-delete delay.
    #[must_use]
    pub fn new(gateway: Arc<dyn ChatGateway>, page_size: u8, delete_delay: Duration) -> Self {
        Self {
            gateway,
            page_size: page_size.max(1),
            delete_delay,
        }
    }

    /// Create a purge from relay settings.
    #[must_use]
    pub fn from_settings(gateway: Arc<dyn ChatGateway>, settings: &RelaySettings) -> Self {
        Self::new(
            gateway,
            settings.purge_page_size,
            settings.purge_delete_delay(),
        )
    }

    /// Delete every bot-authored message in `channel`; returns the count.
    ///
    /// # Errors
    ///
    /// The first fetch or delete failure aborts the purge and is returned.
    /// Messages deleted before the failure stay deleted.
    pub async fn purge(&self, channel: ChannelId) -> Result<usize, GatewayError> {
        let mut deleted = 0usize;
        let mut before: Option<MessageId> = None;

        loop {
            let page = self
                .gateway
                .fetch_messages(channel, self.page_size, before)
                .await?;
            let page_len = page.len();
            before = page.iter().map(|m| m.id).min();

            let own: Vec<MessageId> = page
                .iter()
                .filter(|m| m.authored_by_self)
                .filter(|m| m.deletable)
                .map(|m| m.id)
                .collect();
            let authored = page.iter().filter(|m| m.authored_by_self).count();
            debug!(channel, page_len, authored, "Fetched history page");

            for id in own {
                if deleted > 0 {
                    tokio::time::sleep(self.delete_delay).await;
                }
                self.gateway.delete_message(channel, id).await?;
                deleted += 1;
            }

            if authored == 0 || page_len < usize::from(self.page_size) {
                break;
            }
        }

        info!(channel, deleted, "Purged bot messages");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{HistoryMessage, MockChatGateway};
    use mockall::predicate::{always, eq};

    fn own(id: MessageId) -> HistoryMessage {
        HistoryMessage {
            id,
            authored_by_self: true,
            deletable: true,
        }
    }

    fn user(id: MessageId) -> HistoryMessage {
        HistoryMessage {
            id,
            authored_by_self: false,
            deletable: true,
        }
    }

    #[tokio::test]
    async fn test_stops_on_page_without_own_messages() -> Result<(), GatewayError> {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_fetch_messages()
            .with(eq(9_u64), eq(3_u8), eq(None::<MessageId>))
            .times(1)
            .returning(|_, _, _| Ok(vec![user(30), user(20), user(10)]));
        gateway.expect_delete_message().never();

        let purge = HistoryPurge::new(Arc::new(gateway), 3, Duration::ZERO);
        assert_eq!(purge.purge(9).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_skips_undeletable_and_pages_with_cursor() -> Result<(), GatewayError> {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_fetch_messages()
            .with(eq(9_u64), eq(3_u8), eq(None::<MessageId>))
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    own(60),
                    HistoryMessage {
                        id: 50,
                        authored_by_self: true,
                        deletable: false,
                    },
                    user(40),
                ])
            });
        gateway
            .expect_fetch_messages()
            .with(eq(9_u64), eq(3_u8), eq(Some(40_u64)))
            .times(1)
            .returning(|_, _, _| Ok(vec![own(30)]));
        gateway
            .expect_delete_message()
            .with(always(), eq(60_u64))
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_delete_message()
            .with(always(), eq(30_u64))
            .times(1)
            .returning(|_, _| Ok(()));

        let purge = HistoryPurge::new(Arc::new(gateway), 3, Duration::ZERO);
        assert_eq!(purge.purge(9).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_error_aborts() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_fetch_messages()
            .times(1)
            .returning(|_, _, _| Ok(vec![own(2), own(1)]));
        gateway
            .expect_delete_message()
            .times(1)
            .returning(|_, _| Err(GatewayError::Delete("missing permissions".to_string())));

        let purge = HistoryPurge::new(Arc::new(gateway), 100, Duration::ZERO);
        assert!(matches!(
            purge.purge(9).await,
            Err(GatewayError::Delete(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_deletions_only() -> Result<(), GatewayError> {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_fetch_messages()
            .times(1)
            .returning(|_, _, _| Ok(vec![own(3), own(2), own(1)]));

        let started = tokio::time::Instant::now();
        let deleted_at = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&deleted_at);
        gateway
            .expect_delete_message()
            .times(3)
            .returning(move |_, _| {
                if let Ok(mut log) = log.lock() {
                    log.push(tokio::time::Instant::now() - started);
                }
                Ok(())
            });

        let purge = HistoryPurge::new(Arc::new(gateway), 100, Duration::from_secs(1));
        assert_eq!(purge.purge(9).await?, 3);

        assert!(started.elapsed() >= Duration::from_secs(2));
        let offsets = deleted_at.lock().map(|l| l.clone()).unwrap_or_default();
        assert_eq!(offsets.len(), 3);
        assert!(offsets[0] < Duration::from_millis(1));
        assert!(offsets[1] >= Duration::from_secs(1));
        assert!(offsets[2] >= Duration::from_secs(2));
        Ok(())
    }
}
