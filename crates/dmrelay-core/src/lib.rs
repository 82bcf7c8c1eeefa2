#![deny(missing_docs)]
//! dmrelay core library.
//!
//! Relay pipeline between a chat gateway and a conversational agent:
//! per-user cooldowns, DM history purge, response streaming and routing.

/// Conversational agent seam and stream events.
pub mod agent;
/// Configuration management.
pub mod config;
/// Per-user cooldown tracking.
pub mod cooldown;
/// Error taxonomy shared by the relay pipeline.
pub mod error;
/// Chat gateway seam and message types.
pub mod gateway;
/// OpenAI-compatible streaming agent.
pub mod llm;
/// User-facing notice texts.
pub mod notices;
/// Bot message history purge.
pub mod purge;
/// Inbound message routing.
pub mod router;
/// Agent output to chat message streaming.
pub mod streamer;
/// Utility functions.
pub mod utils;

/// Mock constructors for unit tests.
#[cfg(test)]
pub mod testing;
