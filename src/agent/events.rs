//! Turn progress events.
//!
//! Channels implement [`TurnSink`] to surface typing indicators,
//! streamed tokens, and tool progress. Every method defaults to a no-op
//! so sinks only implement what their platform can display. Sink
//! methods must not fail; a channel that cannot deliver an event drops
//! it.

use crate::model::TokenUsage;
use async_trait::async_trait;

#[async_trait]
pub trait TurnSink: Send + Sync {
    /// The turn started; show a typing indicator if the platform has one.
    async fn on_typing(&self) {}

    /// A streamed text delta, with the text accumulated so far this round.
    async fn on_token(&self, _delta: &str, _accumulated: &str) {}

    /// Usage reported for a completed model round.
    async fn on_token_count(&self, _usage: TokenUsage) {}

    /// A tool call is about to execute.
    async fn on_tool_start(&self, _call_id: &str, _tool_name: &str) {}

    /// The model emitted a complete tool call.
    async fn on_tool_use(&self, _call_id: &str, _tool_name: &str, _args: &serde_json::Value) {}

    /// A worker record was created for a tool call.
    async fn on_agent_start(&self, _worker_id: &str, _tool_name: &str) {}

    async fn on_agent_complete(&self, _worker_id: &str, _success: bool) {}

    /// Terminal event carrying the final post-processed text. Never
    /// emitted for cancelled turns.
    async fn on_done(&self, _text: &str) {}

    async fn on_error(&self, _message: &str) {}
}

/// Sink for callers that do not surface progress.
pub struct NoopSink;

#[async_trait]
impl TurnSink for NoopSink {}
