//! Error taxonomy for the relay pipeline.

use crate::agent::AgentError;
use crate::gateway::GatewayError;
use thiserror::Error;

/// Failure while relaying one message.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The agent could not be invoked or its stream broke
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// The chat platform rejected an outbound operation
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl RelayError {
    /// Map the error onto the user-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Agent(e) if e.is_rate_limit() => ErrorKind::UpstreamRateLimit,
            _ => ErrorKind::Unclassified,
        }
    }
}

/// User-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inbound text too long
    Validation,
    /// Rejected by the per-user cooldown
    Cooldown,
    /// The agent provider throttled the request
    UpstreamRateLimit,
    /// One tool invocation failed inside a response
    ToolExecution,
    /// Anything else during streaming
    Unclassified,
    /// History deletion failed
    Purge,
}
