//! OpenAI-compatible streaming agent
//!
//! Implements [`ConversationalAgent`] on top of a chat completions endpoint
//! with server-sent events. Each step streams one completion; requested
//! tools run through a [`ToolRegistry`] and their results are fed back until
//! the model stops asking for tools or the step bound is reached.

mod http_utils;
mod stream;
/// Tools callable by the model.
pub mod tools;

use crate::agent::{AgentError, AgentOptions, ConversationalAgent, EventStream, StreamEvent};
use crate::config::RelaySettings;
use eventsource_stream::Eventsource;
use futures_util::{stream as futures_stream, StreamExt};
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use http_utils::{create_http_client, parse_retry_after};
pub use tools::{AgentTool, CurrentTimeTool, ToolRegistry};

use self::stream::{PendingToolCall, StepState};

/// Buffered events between the HTTP task and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// A message in the chat completions conversation
#[derive(Debug, Serialize, Clone)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user",
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    fn assistant_with_tools(content: String, calls: &[PendingToolCall]) -> Self {
        let tool_calls = calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments },
                })
            })
            .collect();
        Self {
            role: "assistant",
            content: if content.is_empty() { None } else { Some(content) },
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    fn tool(tool_call_id: &str, content: String) -> Self {
        Self {
            role: "tool",
            content: Some(content),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }
}

/// Agent backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiCompatAgent {
    http_client: HttpClient,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    system_message: Option<String>,
    tools: Arc<ToolRegistry>,
}

impl OpenAiCompatAgent {
    /// Build the agent from relay settings.
    #[must_use]
    pub fn new(settings: &RelaySettings, tools: ToolRegistry) -> Self {
        Self {
            http_client: create_http_client(settings.agent_http_timeout()),
            endpoint: format!(
                "{}/chat/completions",
                settings.agent_api_base.trim_end_matches('/')
            ),
            api_key: settings.agent_api_key.clone(),
            model: settings.agent_model.clone(),
            system_message: settings.system_message.clone(),
            tools: Arc::new(tools),
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if !self.tools.is_empty() {
            body["tools"] = Value::Array(self.tools.definitions());
        }
        body
    }

    async fn send_request(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
    ) -> Result<reqwest::Response, AgentError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(http_utils::error_from_response(response).await);
        }
        Ok(response)
    }

    /// Stream one completion step, forwarding events as they arrive.
    ///
    /// Returns `None` if the consumer went away.
    async fn consume_step(
        response: reqwest::Response,
        tx: &mpsc::Sender<Result<StreamEvent, AgentError>>,
    ) -> Result<Option<StepState>, AgentError> {
        let mut sse = response.bytes_stream().eventsource();
        let mut state = StepState::default();

        while let Some(event) = sse.next().await {
            let event = event.map_err(|e| AgentError::Network(format!("SSE stream error: {e}")))?;
            let Some(chunk) = StepState::parse(&event.data)? else {
                break;
            };
            for produced in state.apply(chunk) {
                if tx.send(Ok(produced)).await.is_err() {
                    return Ok(None);
                }
            }
        }

        Ok(Some(state))
    }

    async fn run_steps(
        self,
        api_key: String,
        mut messages: Vec<ChatMessage>,
        first_response: reqwest::Response,
        max_steps: usize,
        tx: mpsc::Sender<Result<StreamEvent, AgentError>>,
    ) {
        let mut response = first_response;
        let mut step = 1;

        loop {
            let state = match Self::consume_step(response, &tx).await {
                Ok(Some(state)) => state,
                Ok(None) => return,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            let (content, calls, finish_reason) = state.into_parts();
            debug!(
                step,
                tool_calls = calls.len(),
                content_len = content.len(),
                "Completion step finished"
            );

            if calls.is_empty() || step >= max_steps {
                if !calls.is_empty() {
                    warn!(max_steps, "Step bound reached with pending tool calls");
                }
                let _ = tx
                    .send(Ok(StreamEvent::Finish {
                        reason: finish_reason,
                    }))
                    .await;
                return;
            }

            messages.push(ChatMessage::assistant_with_tools(content, &calls));
            for call in &calls {
                let (event, tool_output) = match self.tools.execute(&call.name, &call.arguments).await
                {
                    Ok(payload) => {
                        let output = payload.to_string();
                        (
                            StreamEvent::ToolResult {
                                tool_name: call.name.clone(),
                                payload,
                            },
                            output,
                        )
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool call failed");
                        (
                            StreamEvent::Error {
                                cause: format!("{}: {e}", call.name),
                            },
                            json!({ "error": e.to_string() }).to_string(),
                        )
                    }
                };
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
                messages.push(ChatMessage::tool(&call.id, tool_output));
            }

            step += 1;
            response = match self.send_request(&api_key, &messages).await {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
        }
    }
}

#[async_trait::async_trait]
impl ConversationalAgent for OpenAiCompatAgent {
    async fn stream(&self, text: &str, options: AgentOptions) -> Result<EventStream, AgentError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| AgentError::MissingConfig("agent_api_key".to_string()))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_message {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(text));

        info!(model = %self.model, max_steps = options.max_steps, "Starting agent stream");
        // The first request runs inline so a rejected invocation surfaces here
        let first_response = self.send_request(&api_key, &messages).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let agent = self.clone();
        tokio::spawn(agent.run_steps(
            api_key,
            messages,
            first_response,
            options.max_steps.max(1),
            tx,
        ));

        Ok(futures_stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}
