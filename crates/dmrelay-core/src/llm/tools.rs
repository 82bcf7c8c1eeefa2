//! Tools the agent may call between completion steps.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A function the model can invoke.
#[async_trait::async_trait]
pub trait AgentTool: Send + Sync {
    /// Identifier exposed to the model
    fn name(&self) -> &str;
    /// What the tool does
    fn description(&self) -> &str;
    /// JSON schema of the arguments
    fn parameters(&self) -> Value;
    /// Run the tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails; the failure is reported to the
    /// user and fed back to the model.
    async fn call(&self, arguments: Value) -> Result<Value>;
}

/// Registered tools, keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tool.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function definitions in the chat completions `tools` format.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect()
    }

    /// Run `name` with raw JSON `arguments` (empty means no arguments).
    ///
    /// # Errors
    ///
    /// Returns an error for unknown tools, malformed arguments or a failing tool.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        let args = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| anyhow!("invalid arguments for `{name}`: {e}"))?
        };
        tool.call(args).await
    }
}

/// Reports the current UTC time.
pub struct CurrentTimeTool;

#[async_trait::async_trait]
impl AgentTool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Returns the current date and time in UTC."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _arguments: Value) -> Result<Value> {
        let now = chrono::Utc::now();
        Ok(json!({
            "utc": now.to_rfc3339(),
            "unix": now.timestamp(),
        }))
    }
}
