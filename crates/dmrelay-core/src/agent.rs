//! Conversational agent seam
//!
//! An agent turns one user text into a lazy, ordered, single-pass stream of
//! [`StreamEvent`]s. `Err` items in the stream are transport failures and
//! end the current relay; [`StreamEvent::Error`] is a per-tool failure the
//! relay reports and moves past.

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an agent invocation or its transport.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    Api(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    Network(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Rate limit exceeded (429), optionally with a wait time
    #[error("Rate limit exceeded: {message} (wait: {wait_secs:?}s)")]
    RateLimit {
        /// Retry-After duration in seconds, if provided by the server
        wait_secs: Option<u64>,
        /// Error message from the server
        message: String,
    },
}

impl AgentError {
    /// Whether the provider throttled the request.
    ///
    /// Besides the dedicated variant this also recognises API errors whose
    /// body carries a rate-limit marker, since some gateways answer with a
    /// non-429 status and a `rate_limit_exceeded` code.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Api(msg) => {
                let lower = msg.to_lowercase();
                // Status-prefixed bodies look like "429 Too Many Requests - ..."
                lower.starts_with("429 ")
                    || lower.contains("too many requests")
                    || lower.contains("rate limit")
                    || lower.contains("rate_limit")
            }
            _ => false,
        }
    }
}

/// One incremental unit of agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A piece of response text
    TextDelta {
        /// Text to append
        text: String,
    },
    /// A tool invocation has started
    ToolCallStarted {
        /// Raw tool identifier
        tool_name: String,
    },
    /// A tool invocation returned
    ToolResult {
        /// Raw tool identifier
        tool_name: String,
        /// Tool output
        payload: serde_json::Value,
    },
    /// A tool invocation failed; the response continues
    Error {
        /// Failure description
        cause: String,
    },
    /// The agent finished
    Finish {
        /// Provider finish reason, if any
        reason: Option<String>,
    },
}

impl StreamEvent {
    /// Shorthand for a text fragment.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Shorthand for a tool start.
    #[must_use]
    pub fn tool_started(tool_name: impl Into<String>) -> Self {
        Self::ToolCallStarted {
            tool_name: tool_name.into(),
        }
    }
}

/// Lazy, ordered, finite sequence of agent events.
pub type EventStream = BoxStream<'static, Result<StreamEvent, AgentError>>;

/// Per-invocation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOptions {
    /// Bound on reasoning/tool steps
    pub max_steps: usize,
}

/// Interface for conversational agents.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ConversationalAgent: Send + Sync {
    /// Start answering `text`.
    ///
    /// # Errors
    ///
    /// Returns an `AgentError` if the invocation cannot be started.
    async fn stream(&self, text: &str, options: AgentOptions) -> Result<EventStream, AgentError>;
}

/// Derives user-facing tool names from raw tool identifiers.
#[derive(Debug, Clone, Default)]
pub struct ToolNameNormalizer {
    prefix: Option<String>,
}

impl ToolNameNormalizer {
    /// Strip `prefix` (if any) from every identifier.
    #[must_use]
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    /// Display name for `raw`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dmrelay_core::agent::ToolNameNormalizer;
    ///
    /// let normalizer = ToolNameNormalizer::new(Some("mcp_".to_string()));
    /// assert_eq!(normalizer.display_name("mcp_weather"), "weather");
    /// assert_eq!(normalizer.display_name("search"), "search");
    /// ```
    #[must_use]
    pub fn display_name(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        let stripped = self
            .prefix
            .as_deref()
            .and_then(|prefix| trimmed.strip_prefix(prefix))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(trimmed);
        stripped.to_string()
    }
}
