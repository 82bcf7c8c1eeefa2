//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked gateways and agents.

use crate::agent::{AgentError, MockConversationalAgent, StreamEvent};
use crate::gateway::MockChatGateway;
use futures_util::{stream, StreamExt};
use std::sync::{Arc, Mutex};

/// Create a mock gateway that records every sent text and accepts typing.
///
/// History fetches and deletions are not expected; tests that need them
/// add their own expectations on the returned mock.
#[must_use]
pub fn mock_gateway_recording() -> (MockChatGateway, Arc<Mutex<Vec<String>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut mock = MockChatGateway::new();

    mock.expect_start_typing().returning(|_| Ok(()));

    let log = Arc::clone(&sent);
    mock.expect_send_message().returning(move |_, text| {
        let mut log = log.lock().map_err(|_| {
            crate::gateway::GatewayError::Transport("poisoned log".to_string())
        })?;
        log.push(text.to_string());
        Ok(log.len() as u64)
    });

    (mock, sent)
}

/// Create a mock agent that replays `events` on its only invocation.
#[must_use]
pub fn mock_agent_scripted(events: Vec<Result<StreamEvent, AgentError>>) -> MockConversationalAgent {
    let mut mock = MockConversationalAgent::new();
    mock.expect_stream()
        .times(1)
        .return_once(move |_, _| Ok(stream::iter(events).boxed()));
    mock
}

/// Create a mock agent that must never be invoked.
#[must_use]
pub fn mock_agent_unused() -> MockConversationalAgent {
    let mut mock = MockConversationalAgent::new();
    mock.expect_stream().never();
    mock
}
