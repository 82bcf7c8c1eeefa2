//! Response streaming
//!
//! Drives one user text through the agent and turns the event stream into a
//! series of chat messages. Text is buffered and flushed in chunks no longer
//! than the flush threshold; tool starts produce one progress notice per
//! display name.

use crate::agent::{AgentOptions, ConversationalAgent, StreamEvent, ToolNameNormalizer};
use crate::config::RelaySettings;
use crate::error::RelayError;
use crate::gateway::{ChannelId, ChatGateway};
use crate::notices;
use crate::utils::take_prefix;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Streaming limits.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Flush once the buffer holds more than this many characters
    pub flush_threshold: usize,
    /// Step bound forwarded to the agent
    pub max_steps: usize,
}

impl From<&RelaySettings> for StreamSettings {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            flush_threshold: settings.flush_threshold,
            max_steps: settings.agent_max_steps,
        }
    }
}

/// Summary of one streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    /// Text messages sent
    pub messages_sent: usize,
    /// Tool and error notices sent
    pub notices_sent: usize,
    /// Characters of response text relayed
    pub chars_relayed: usize,
    /// Distinct tool display names announced
    pub tools_announced: Vec<String>,
    /// Tool failures reported inline
    pub tool_errors: usize,
}

/// Per-response accumulator.
struct OutboundBuffer {
    text: String,
    chars: usize,
}

impl OutboundBuffer {
    const fn new() -> Self {
        Self {
            text: String::new(),
            chars: 0,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.chars += fragment.chars().count();
    }

    /// Next chunk to send while the buffer is over `threshold`.
    fn next_overflow_chunk(&mut self, threshold: usize) -> Option<String> {
        if self.chars <= threshold {
            return None;
        }
        let chunk = take_prefix(&mut self.text, threshold);
        self.chars -= chunk.chars().count();
        Some(chunk)
    }

    fn drain(&mut self) -> Option<String> {
        if self.text.is_empty() {
            return None;
        }
        self.chars = 0;
        Some(std::mem::take(&mut self.text))
    }
}

/// Relays agent output into chat messages.
pub struct ResponseStreamer {
    agent: Arc<dyn ConversationalAgent>,
    gateway: Arc<dyn ChatGateway>,
    normalizer: ToolNameNormalizer,
    settings: StreamSettings,
}

impl ResponseStreamer {
    /// Create a streamer.
    #[must_use]
    pub fn new(
        agent: Arc<dyn ConversationalAgent>,
        gateway: Arc<dyn ChatGateway>,
        normalizer: ToolNameNormalizer,
        settings: StreamSettings,
    ) -> Self {
        Self {
            agent,
            gateway,
            normalizer,
            settings,
        }
    }

    /// Answer `text` in `channel`.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Agent` if the agent cannot be started or its
    /// stream fails, and `RelayError::Gateway` if a message cannot be sent.
    /// Tool failures inside the stream are reported inline instead.
    pub async fn relay(&self, channel: ChannelId, text: &str) -> Result<StreamReport, RelayError> {
        if let Err(e) = self.gateway.start_typing(channel).await {
            debug!(channel, error = %e, "Typing indicator failed");
        }

        let options = AgentOptions {
            max_steps: self.settings.max_steps,
        };
        let mut events = self.agent.stream(text, options).await?;

        let mut buffer = OutboundBuffer::new();
        let mut announced: HashSet<String> = HashSet::new();
        let mut report = StreamReport::default();

        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::TextDelta { text } => buffer.push(&text),
                StreamEvent::ToolCallStarted { tool_name } => {
                    let display_name = self.normalizer.display_name(&tool_name);
                    if announced.insert(display_name.clone()) {
                        info!(channel, tool = %display_name, "Agent invoked tool");
                        self.gateway
                            .send_message(channel, &notices::tool_checking(&display_name))
                            .await?;
                        report.notices_sent += 1;
                        report.tools_announced.push(display_name);
                    }
                }
                StreamEvent::ToolResult { tool_name, .. } => {
                    debug!(channel, tool = %tool_name, "Tool returned");
                }
                StreamEvent::Error { cause } => {
                    warn!(channel, cause = %cause, "Tool execution failed");
                    self.gateway.send_message(channel, notices::TOOL_ERROR).await?;
                    report.notices_sent += 1;
                    report.tool_errors += 1;
                }
                StreamEvent::Finish { reason } => {
                    debug!(channel, reason = ?reason, "Agent finished");
                }
            }

            while let Some(chunk) = buffer.next_overflow_chunk(self.settings.flush_threshold) {
                self.flush(channel, &chunk, &mut report).await?;
            }
        }

        if let Some(rest) = buffer.drain() {
            self.flush(channel, &rest, &mut report).await?;
        }

        Ok(report)
    }

    async fn flush(
        &self,
        channel: ChannelId,
        chunk: &str,
        report: &mut StreamReport,
    ) -> Result<(), RelayError> {
        self.gateway.send_message(channel, chunk).await?;
        report.messages_sent += 1;
        report.chars_relayed += chunk.chars().count();
        Ok(())
    }
}
