use crate::agent::{AgentError, StreamEvent};
use std::collections::BTreeMap;

// Streaming structures for OpenAI-compatible chat completions
#[derive(serde::Deserialize, Debug)]
pub(super) struct StreamChunk {
    #[serde(default)]
    pub(super) choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize, Debug)]
pub(super) struct StreamChoice {
    #[serde(default)]
    pub(super) delta: StreamDelta,
    pub(super) finish_reason: Option<String>,
}

#[derive(serde::Deserialize, Debug, Default)]
pub(super) struct StreamDelta {
    pub(super) content: Option<String>,
    pub(super) tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(serde::Deserialize, Debug)]
pub(super) struct StreamToolCall {
    pub(super) index: usize,
    pub(super) id: Option<String>,
    pub(super) function: Option<StreamFunction>,
}

#[derive(serde::Deserialize, Debug)]
pub(super) struct StreamFunction {
    pub(super) name: Option<String>,
    pub(super) arguments: Option<String>,
}

/// A tool call assembled from streamed fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PendingToolCall {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) arguments: String,
}

/// Accumulated state of one completion step.
#[derive(Debug, Default)]
pub(super) struct StepState {
    pub(super) content: String,
    tool_calls: BTreeMap<usize, PendingToolCall>,
    pub(super) finish_reason: Option<String>,
}

impl StepState {
    /// Parse one SSE `data` payload. `Ok(None)` marks the `[DONE]` sentinel.
    pub(super) fn parse(data: &str) -> Result<Option<StreamChunk>, AgentError> {
        if data.trim() == "[DONE]" {
            return Ok(None);
        }
        serde_json::from_str(data)
            .map(Some)
            .map_err(|e| AgentError::Json(format!("Failed to parse event data: {e}")))
    }

    /// Fold a chunk into the step and return the events it produces.
    pub(super) fn apply(&mut self, chunk: StreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };

        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                self.content.push_str(&text);
                events.push(StreamEvent::TextDelta { text });
            }
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            if let Some(existing) = self.tool_calls.get_mut(&tc.index) {
                if let Some(args) = tc.function.and_then(|f| f.arguments) {
                    existing.arguments.push_str(&args);
                }
                continue;
            }

            let (name, arguments) = match tc.function {
                Some(StreamFunction {
                    name: Some(name),
                    arguments,
                }) => (name, arguments.unwrap_or_default()),
                _ => continue,
            };
            let id = tc.id.unwrap_or_else(|| format!("call_{}", tc.index));
            events.push(StreamEvent::ToolCallStarted {
                tool_name: name.clone(),
            });
            self.tool_calls.insert(
                tc.index,
                PendingToolCall {
                    id,
                    name,
                    arguments,
                },
            );
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }

        events
    }

    /// Step content, tool calls ordered by stream index, and finish reason.
    pub(super) fn into_parts(self) -> (String, Vec<PendingToolCall>, Option<String>) {
        (
            self.content,
            self.tool_calls.into_values().collect(),
            self.finish_reason,
        )
    }
}
