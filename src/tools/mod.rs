//! Tool execution.
//!
//! The round loop hands every batch of tool calls to a [`ToolExecutor`]
//! and always gets results back: individual tool failures are folded
//! into error-flagged results the model can react to, never into turn
//! failures. A tool may also request a conversation switch, which the
//! loop applies once per turn.

use crate::model::{ConversationId, ToolCall, ToolResult};
use crate::providers::ToolDefinition;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Identity and routing facts for the turn, passed to every tool.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub gateway_id: String,
    pub agent_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub user_role: Option<String>,
}

/// What a tool produced: text for the model, and optionally a request
/// to move the rest of the turn into another conversation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub content: String,
    pub conversation_switch: Option<ConversationId>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            conversation_switch: None,
        }
    }
}

/// Outcome of executing one batch of calls, in call order.
#[derive(Debug, Clone, Default)]
pub struct ToolBatchOutcome {
    pub results: Vec<ToolResult>,
    /// First switch requested in the batch, if any.
    pub conversation_switch: Option<ConversationId>,
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a batch of calls. Infallible by contract: per-call errors
    /// become `is_error` results.
    async fn execute_tools(&self, calls: &[ToolCall], ctx: &TurnContext) -> ToolBatchOutcome;

    /// Tool surface to advertise to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the tool's arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &TurnContext,
    ) -> anyhow::Result<ToolOutput>;
}

/// Name-keyed registry; the default executor.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute_tools(&self, calls: &[ToolCall], ctx: &TurnContext) -> ToolBatchOutcome {
        let mut outcome = ToolBatchOutcome::default();
        for call in calls {
            let result = match self.tools.get(&call.name) {
                Some(tool) => match tool.execute(call.arguments.clone(), ctx).await {
                    Ok(output) => {
                        if outcome.conversation_switch.is_none() {
                            outcome.conversation_switch = output.conversation_switch;
                        }
                        ToolResult {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            content: output.content,
                            is_error: false,
                        }
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool execution failed");
                        ToolResult {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            content: format!("Error: {e}"),
                            is_error: true,
                        }
                    }
                },
                None => ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: format!("Error: unknown tool '{}'", call.name),
                    is_error: true,
                },
            };
            outcome.results.push(result);
        }
        outcome
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its input back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(
            &self,
            args: serde_json::Value,
            _ctx: &TurnContext,
        ) -> anyhow::Result<ToolOutput> {
            let text = args["text"].as_str().unwrap_or_default();
            Ok(ToolOutput::text(text))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &TurnContext,
        ) -> anyhow::Result<ToolOutput> {
            anyhow::bail!("boom")
        }
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn batch_results_stay_in_call_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Failing));

        let outcome = registry
            .execute_tools(
                &[
                    call("t1", "echo", serde_json::json!({"text": "hi"})),
                    call("t2", "failing", serde_json::json!({})),
                    call("t3", "echo", serde_json::json!({"text": "bye"})),
                ],
                &TurnContext::default(),
            )
            .await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].content, "hi");
        assert!(!outcome.results[0].is_error);
        assert!(outcome.results[1].is_error);
        assert!(outcome.results[1].content.contains("boom"));
        assert_eq!(outcome.results[2].content, "bye");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let registry = ToolRegistry::new();
        let outcome = registry
            .execute_tools(
                &[call("t1", "nope", serde_json::json!({}))],
                &TurnContext::default(),
            )
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].is_error);
        assert!(outcome.results[0].content.contains("unknown tool"));
    }

    #[test]
    fn definitions_are_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Echo));
        let defs = registry.definitions();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "failing");
    }
}
