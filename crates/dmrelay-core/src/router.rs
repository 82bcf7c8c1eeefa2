//! Inbound message routing
//!
//! Entry point for every inbound message. Filters out non-DM and bot
//! traffic, enforces the length limit and the per-user cooldown, handles the
//! history clear command and otherwise relays the text through the agent.
//! Every failure ends in a single notice to the user; nothing propagates.

use crate::config::RelaySettings;
use crate::cooldown::{Clock, CooldownStatus, CooldownTracker};
use crate::error::ErrorKind;
use crate::gateway::{ChannelId, ChatGateway, InboundMessage};
use crate::notices;
use crate::purge::HistoryPurge;
use crate::streamer::{ResponseStreamer, StreamReport};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Bot author or non-direct channel
    Ignored,
    /// Text longer than allowed
    TooLong,
    /// Rejected by the cooldown
    CoolingDown {
        /// Seconds the user was asked to wait
        remaining_secs: u64,
    },
    /// History clear finished
    Purged {
        /// Messages deleted
        deleted: usize,
    },
    /// Agent response relayed
    Relayed(StreamReport),
    /// Processing failed and the user was notified
    Failed(ErrorKind),
}

impl RouteOutcome {
    /// Error category the user was notified about, if any.
    ///
    /// A relayed response with inline tool failures reports `ToolExecution`.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ignored | Self::Purged { .. } => None,
            Self::TooLong => Some(ErrorKind::Validation),
            Self::CoolingDown { .. } => Some(ErrorKind::Cooldown),
            Self::Relayed(report) if report.tool_errors > 0 => Some(ErrorKind::ToolExecution),
            Self::Relayed(_) => None,
            Self::Failed(kind) => Some(*kind),
        }
    }
}

/// Routes inbound messages through the relay pipeline.
pub struct MessageRouter {
    gateway: Arc<dyn ChatGateway>,
    cooldown: Arc<CooldownTracker>,
    streamer: ResponseStreamer,
    purge: HistoryPurge,
    clock: Arc<dyn Clock>,
    max_inbound_length: usize,
    clear_command: String,
}

impl MessageRouter {
    /// Assemble a router from its collaborators.
    #[must_use]
    pub fn new(
        settings: &RelaySettings,
        gateway: Arc<dyn ChatGateway>,
        cooldown: Arc<CooldownTracker>,
        streamer: ResponseStreamer,
        purge: HistoryPurge,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            cooldown,
            streamer,
            purge,
            clock,
            max_inbound_length: settings.max_inbound_length,
            clear_command: settings.clear_command.clone(),
        }
    }

    /// Shared cooldown tracker, for the sweep task.
    #[must_use]
    pub fn cooldown(&self) -> Arc<CooldownTracker> {
        Arc::clone(&self.cooldown)
    }

    /// Handle one inbound message to completion.
    pub async fn handle(&self, msg: &InboundMessage) -> RouteOutcome {
        if !msg.is_relayable() {
            return RouteOutcome::Ignored;
        }

        let user_id = msg.author_id;
        let channel = msg.channel_id;
        let length = msg.content.chars().count();

        if length > self.max_inbound_length {
            info!(user_id, length, "Rejected oversized message");
            self.notify(channel, &notices::message_too_long(self.max_inbound_length))
                .await;
            return RouteOutcome::TooLong;
        }

        let now = self.clock.now_ms();
        if let CooldownStatus::Waiting { remaining_secs } = self.cooldown.check(user_id, now).await
        {
            self.notify(channel, &notices::cooldown_wait(remaining_secs))
                .await;
            return RouteOutcome::CoolingDown { remaining_secs };
        }

        if msg.content == self.clear_command {
            return self.clear_history(channel, user_id).await;
        }

        // Armed before the agent runs so a slow response still blocks resubmission
        self.cooldown.arm(user_id, now).await;
        debug!(user_id, channel, length, "Relaying message to agent");

        match self.streamer.relay(channel, &msg.content).await {
            Ok(report) => {
                info!(
                    user_id,
                    messages = report.messages_sent,
                    notices = report.notices_sent,
                    chars = report.chars_relayed,
                    "Relayed agent response"
                );
                RouteOutcome::Relayed(report)
            }
            Err(e) => {
                self.cooldown.release(user_id).await;
                let kind = e.kind();
                error!(user_id, channel, error = %e, kind = ?kind, "Relay failed");
                let notice = match kind {
                    ErrorKind::UpstreamRateLimit => notices::UPSTREAM_RATE_LIMIT,
                    _ => notices::GENERIC_ERROR,
                };
                self.notify(channel, notice).await;
                RouteOutcome::Failed(kind)
            }
        }
    }

    async fn clear_history(&self, channel: ChannelId, user_id: u64) -> RouteOutcome {
        info!(user_id, channel, "Clearing DM history");
        self.notify(channel, notices::PURGE_STARTED).await;

        match self.purge.purge(channel).await {
            Ok(deleted) => {
                self.notify(channel, &notices::purge_finished(deleted)).await;
                RouteOutcome::Purged { deleted }
            }
            Err(e) => {
                error!(user_id, channel, error = %e, "History purge failed");
                self.notify(channel, notices::GENERIC_ERROR).await;
                RouteOutcome::Failed(ErrorKind::Purge)
            }
        }
    }

    async fn notify(&self, channel: ChannelId, text: &str) {
        if let Err(e) = self.gateway.send_message(channel, text).await {
            warn!(channel, error = %e, "Failed to deliver notice");
        }
    }
}
